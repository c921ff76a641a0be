mod common;

use bot_core::markup::{parse_incoming_threat_count, parse_troop_movements, parse_village_list};

#[test]
fn village_list_fixture_parses() {
    let villages = parse_village_list(&common::fixture("village_list.html")).expect("list parses");
    assert_eq!(villages.len(), 3);
    assert_eq!(villages[0].name, "Village1");
    assert_eq!(villages[2].locator.query(), "newdid=103");
}

#[test]
fn rally_point_fixture_counts_only_incoming_raids() {
    let page = common::fixture("rally_point_under_attack.html");
    let movements = parse_troop_movements(&page).expect("rally point parses");
    assert_eq!(movements.incoming_raids, 3);
    assert_eq!(movements.incoming_supply, 1);
    assert_eq!(movements.outgoing_raids, 1);
    assert_eq!(parse_incoming_threat_count(&page), Ok(3));
}
