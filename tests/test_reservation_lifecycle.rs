mod common;

use advance_reservation::domain::cluster::node::NodeState;
use advance_reservation::domain::job::job::{JobRecord, JobState};
use advance_reservation::domain::job::job_table::JobTable;
use advance_reservation::domain::persistence::state_codec::decode_show_buffer;
use advance_reservation::domain::reservation::reservation::INFINITE_END;
use advance_reservation::domain::reservation::reservation_flags::{FlagUpdate, FlagsUpdate, ReservationFlags};
use advance_reservation::domain::reservation::reservation_request::{CreateReservationRequest, UpdateReservationRequest};
use advance_reservation::error::{Error, ErrorCode};

use common::{ALICE, HOUR, NOW, fixture, request};

#[test]
fn test_create_explicit_nodes() {
    let mut f = fixture();
    let name = f.manager.create_resv(&request("maint", "acctA", "tux[0-3]", NOW + HOUR, 2), &f.cluster).unwrap();

    assert_eq!(name.as_str(), "maint");
    let resv = f.manager.get("maint").unwrap();
    assert_eq!(resv.resv_id, 1);
    assert_eq!(resv.node_count, 4);
    assert_eq!(resv.cpu_count, 32);
    assert_eq!(resv.node_list.as_deref(), Some("tux[0-3]"));
    assert_eq!(resv.start_time, NOW + HOUR);
    assert_eq!(resv.end_time, NOW + 3 * HOUR);
    assert_eq!(resv.accounts.as_canonical(), Some("acctA"));
    assert!(resv.users.is_empty());

    let events = f.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "add");
    assert_eq!(events[0].1.id, 1);
    assert_eq!(events[0].1.cpus, 32);
    assert_eq!(f.manager.last_resv_update(), NOW);
}

#[test]
fn test_create_all_nodes_and_default_window() {
    let mut f = fixture();
    let request = CreateReservationRequest { users: Some("alice,bob".to_string()), node_list: Some("ALL".to_string()), ..Default::default() };

    let name = f.manager.create_resv(&request, &f.cluster).unwrap();
    let resv = f.manager.get(name.as_str()).unwrap();
    assert_eq!(name.as_str(), "alice_1");
    assert_eq!(resv.node_count, 8);
    assert_eq!(resv.start_time, NOW);
    assert_eq!(resv.end_time, INFINITE_END);
    assert!(resv.has_infinite_end());
    assert!(resv.users.contains(&ALICE));
}

#[test]
fn test_duration_is_minutes() {
    let mut f = fixture();
    let mut request = request("short", "acctA", "tux0", NOW, 1);
    request.end_time = None;
    request.duration = Some(90);

    f.manager.create_resv(&request, &f.cluster).unwrap();
    assert_eq!(f.manager.get("short").unwrap().end_time, NOW + 90 * 60);
}

#[test]
fn test_clock_skew_tolerance() {
    let mut f = fixture();
    assert!(f.manager.create_resv(&request("late_ok", "acctA", "tux0", NOW - 59, 1), &f.cluster).is_ok());

    let err = f.manager.create_resv(&request("too_late", "acctA", "tux1", NOW - 61, 1), &f.cluster).unwrap_err();
    assert!(matches!(err, Error::InvalidTimeValue(_)));
    assert_eq!(err.code(), ErrorCode::InvalidTimeValue);
    assert!(f.manager.get("too_late").is_none());
}

#[test]
fn test_end_not_after_start_rejected() {
    let mut f = fixture();
    let mut request = request("empty", "acctA", "tux0", NOW + HOUR, 1);
    request.end_time = Some(NOW + HOUR);

    assert!(matches!(f.manager.create_resv(&request, &f.cluster), Err(Error::InvalidTimeValue(_))));
    assert!(f.manager.is_empty());
}

#[test]
fn test_overlapping_create_rejected() {
    let mut f = fixture();
    f.manager.create_resv(&request("r1", "acctA", "tux[0-3]", NOW + HOUR, 2), &f.cluster).unwrap();

    let err = f.manager.create_resv(&request("r2", "acctB", "tux[2-5]", NOW + 2 * HOUR, 2), &f.cluster).unwrap_err();
    assert!(matches!(err, Error::InvalidTimeValue(_)));
    assert_eq!(f.manager.len(), 1);
    assert_eq!(f.sink.count("add"), 1);

    // disjoint nodes in the same window
    f.manager.create_resv(&request("r3", "acctB", "tux[4-7]", NOW + HOUR, 2), &f.cluster).unwrap();
    // same nodes, window starting where r1 ends
    f.manager.create_resv(&request("r4", "acctB", "tux[0-3]", NOW + 3 * HOUR, 1), &f.cluster).unwrap();
    assert_eq!(f.manager.len(), 3);
}

#[test]
fn test_create_validation_errors() {
    let mut f = fixture();

    let mut no_identity = request("x", "acctA", "tux0", NOW, 1);
    no_identity.accounts = None;
    assert!(matches!(f.manager.create_resv(&no_identity, &f.cluster), Err(Error::InvalidAccount(_))));

    assert!(matches!(f.manager.create_resv(&request("x", "nosuch", "tux0", NOW, 1), &f.cluster), Err(Error::InvalidAccount(_))));

    let mut bad_user = request("x", "acctA", "tux0", NOW, 1);
    bad_user.users = Some("mallory".to_string());
    assert!(matches!(f.manager.create_resv(&bad_user, &f.cluster), Err(Error::InvalidUser(_))));

    let mut bad_partition = request("x", "acctA", "tux0", NOW, 1);
    bad_partition.partition = Some("nosuch".to_string());
    assert!(matches!(f.manager.create_resv(&bad_partition, &f.cluster), Err(Error::InvalidPartitionName(_))));

    assert!(matches!(f.manager.create_resv(&request("x", "acctA", "tux[7-9]", NOW, 1), &f.cluster), Err(Error::InvalidNodeName(_))));
    assert!(matches!(f.manager.create_resv(&request("x", "acctA", "tux[0-4000000000]", NOW, 1), &f.cluster), Err(Error::InvalidNodeName(_))));

    let mut no_nodes = request("x", "acctA", "tux0", NOW, 1);
    no_nodes.node_list = None;
    assert!(matches!(f.manager.create_resv(&no_nodes, &f.cluster), Err(Error::InvalidNodeName(_))));

    assert!(f.manager.is_empty());
    assert_eq!(f.manager.top_suffix(), 0);
    assert!(f.sink.events().is_empty());
}

#[test]
fn test_duplicate_name_rejected() {
    let mut f = fixture();
    f.manager.create_resv(&request("r1", "acctA", "tux0", NOW, 1), &f.cluster).unwrap();

    let err = f.manager.create_resv(&request("r1", "acctA", "tux1", NOW, 1), &f.cluster).unwrap_err();
    assert!(matches!(err, Error::ReservationInvalid(_)));
    assert_eq!(f.manager.top_suffix(), 1);
}

#[test]
fn test_generated_name_skips_taken_names() {
    let mut f = fixture();
    f.manager.create_resv(&request("acctA_2", "acctA", "tux0", NOW, 1), &f.cluster).unwrap();

    let mut unnamed = request("", "acctA", "tux1", NOW, 1);
    unnamed.name = None;
    let name = f.manager.create_resv(&unnamed, &f.cluster).unwrap();

    assert_eq!(name.as_str(), "acctA_3");
    assert_eq!(f.manager.get("acctA_3").unwrap().resv_id, 3);
}

#[test]
fn test_node_count_prefers_idle_nodes() {
    let mut f = fixture();
    f.cluster.set_node_state("tux0", NodeState::Allocated).unwrap();

    let request = CreateReservationRequest { accounts: Some("acctA".to_string()), node_count: Some(3), ..Default::default() };
    let name = f.manager.create_resv(&request, &f.cluster).unwrap();

    let resv = f.manager.get(name.as_str()).unwrap();
    assert_eq!(resv.node_list.as_deref(), Some("tux[1-3]"));
    assert_eq!(resv.partition.as_ref().map(|p| p.as_str()), Some("batch"));
}

#[test]
fn test_node_count_falls_back_to_busy_nodes() {
    let mut f = fixture();
    for node in ["tux0", "tux1", "tux2", "tux3", "tux4", "tux5"] {
        f.cluster.set_node_state(node, NodeState::Allocated).unwrap();
    }

    let request = CreateReservationRequest { accounts: Some("acctA".to_string()), node_count: Some(4), ..Default::default() };
    let name = f.manager.create_resv(&request, &f.cluster).unwrap();

    assert_eq!(f.manager.get(name.as_str()).unwrap().node_list.as_deref(), Some("tux[0-1,6-7]"));
}

#[test]
fn test_node_count_honors_partition_feature_and_down_nodes() {
    let mut f = fixture();

    let gpu = CreateReservationRequest { name: Some("gpu".to_string()), accounts: Some("acctA".to_string()), features: Some("gpu".to_string()), node_count: Some(2), ..Default::default() };
    f.manager.create_resv(&gpu, &f.cluster).unwrap();
    assert_eq!(f.manager.get("gpu").unwrap().node_list.as_deref(), Some("tux[4-5]"));

    f.cluster.set_node_state("tux7", NodeState::Down).unwrap();
    let debug = CreateReservationRequest {
        name: Some("debug".to_string()),
        accounts: Some("acctA".to_string()),
        partition: Some("debug".to_string()),
        node_count: Some(2),
        ..Default::default()
    };
    let err = f.manager.create_resv(&debug, &f.cluster).unwrap_err();
    assert!(matches!(err, Error::TooManyRequestedNodes { requested: 2, available: 1 }));

    // tux[4-5] are held by "gpu" for the same window
    let rest = CreateReservationRequest { name: Some("rest".to_string()), accounts: Some("acctA".to_string()), node_count: Some(5), ..Default::default() };
    f.manager.create_resv(&rest, &f.cluster).unwrap();
    assert_eq!(f.manager.get("rest").unwrap().node_list.as_deref(), Some("tux[0-3,6]"));
}

#[test]
fn test_too_many_nodes() {
    let mut f = fixture();
    let request = CreateReservationRequest { accounts: Some("acctA".to_string()), node_count: Some(9), ..Default::default() };

    let err = f.manager.create_resv(&request, &f.cluster).unwrap_err();
    assert!(matches!(err, Error::TooManyRequestedNodes { requested: 9, available: 8 }));
    assert_eq!(err.code(), ErrorCode::TooManyRequestedNodes);
}

#[test]
fn test_update_attributes() {
    let mut f = fixture();
    f.manager.create_resv(&request("r1", "acctA", "tux[0-1]", NOW + HOUR, 1), &f.cluster).unwrap();

    let mut update = UpdateReservationRequest::new("r1");
    update.accounts = Some("+acctB".to_string());
    update.users = Some("alice".to_string());
    update.partition = Some("batch".to_string());
    update.features = Some("gpu".to_string());
    update.flags = FlagsUpdate { maint: FlagUpdate::Set, daily: FlagUpdate::Set, ..Default::default() };
    f.manager.update_resv(&update, &f.cluster).unwrap();

    let resv = f.manager.get("r1").unwrap();
    assert_eq!(resv.accounts.as_canonical(), Some("acctA,acctB"));
    assert_eq!(resv.users.as_canonical(), Some("alice"));
    assert_eq!(resv.partition.as_ref().map(|p| p.as_str()), Some("batch"));
    assert_eq!(resv.features.as_deref(), Some("gpu"));
    assert_eq!(resv.flags, ReservationFlags { maint: true, daily: true, weekly: false });

    let mut update = UpdateReservationRequest::new("r1");
    update.flags = FlagsUpdate { daily: FlagUpdate::Clear, ..Default::default() };
    update.partition = Some(String::new());
    update.accounts = Some("-acctA".to_string());
    f.manager.update_resv(&update, &f.cluster).unwrap();

    let resv = f.manager.get("r1").unwrap();
    assert_eq!(resv.flags, ReservationFlags { maint: true, daily: false, weekly: false });
    assert!(resv.partition.is_none());
    assert_eq!(resv.accounts.as_canonical(), Some("acctB"));
    assert_eq!(f.sink.count("modify"), 2);
}

#[test]
fn test_update_window() {
    let mut f = fixture();
    f.manager.create_resv(&request("r1", "acctA", "tux0", NOW + HOUR, 1), &f.cluster).unwrap();

    let mut update = UpdateReservationRequest::new("r1");
    update.start_time = Some(NOW + 2 * HOUR);
    update.duration = Some(30);
    f.manager.update_resv(&update, &f.cluster).unwrap();

    let resv = f.manager.get("r1").unwrap();
    assert_eq!(resv.start_time, NOW + 2 * HOUR);
    assert_eq!(resv.end_time, NOW + 2 * HOUR + 30 * 60);
    assert_eq!(resv.start_time_prev, NOW + HOUR);

    let (_, modify) = f.sink.events().pop().unwrap();
    assert_eq!(modify.time_start_prev, NOW + HOUR);
}

#[test]
fn test_update_overlap_rolls_back_window_and_nodes_only() {
    let mut f = fixture();
    f.manager.create_resv(&request("r1", "acctA", "tux[0-3]", NOW + HOUR, 1), &f.cluster).unwrap();
    f.manager.create_resv(&request("r2", "acctC", "tux[4-7]", NOW + 3 * HOUR, 1), &f.cluster).unwrap();

    let mut update = UpdateReservationRequest::new("r2");
    update.accounts = Some("+acctB".to_string());
    update.flags = FlagsUpdate { maint: FlagUpdate::Set, ..Default::default() };
    update.start_time = Some(NOW + HOUR);
    update.end_time = Some(NOW + 2 * HOUR);
    update.node_list = Some("tux[2-5]".to_string());

    let err = f.manager.update_resv(&update, &f.cluster).unwrap_err();
    assert!(matches!(err, Error::InvalidTimeValue(_)));

    let resv = f.manager.get("r2").unwrap();
    assert_eq!(resv.start_time, NOW + 3 * HOUR);
    assert_eq!(resv.end_time, NOW + 4 * HOUR);
    assert_eq!(resv.node_list.as_deref(), Some("tux[4-7]"));
    assert_eq!(resv.node_count, 4);
    assert_eq!(resv.accounts.as_canonical(), Some("acctC,acctB"));
    assert!(resv.flags.maint);

    assert_eq!(f.sink.count("modify"), 1);
}

#[test]
fn test_update_invalid_node_name_keeps_window_and_nodes() {
    let mut f = fixture();
    f.manager.create_resv(&request("r1", "acctA", "tux[0-1]", NOW + HOUR, 2), &f.cluster).unwrap();

    let mut update = UpdateReservationRequest::new("r1");
    update.start_time = Some(NOW + HOUR + 600);
    update.end_time = Some(NOW + 3 * HOUR);
    update.node_list = Some("tux[0-1],nosuch".to_string());

    let err = f.manager.update_resv(&update, &f.cluster).unwrap_err();
    assert!(matches!(err, Error::InvalidNodeName(_)));

    let resv = f.manager.get("r1").unwrap();
    assert_eq!(resv.start_time, NOW + HOUR);
    assert_eq!(resv.end_time, NOW + 3 * HOUR);
    assert_eq!(resv.start_time_prev, NOW + HOUR);
    assert_eq!(resv.node_list.as_deref(), Some("tux[0-1]"));
    assert_eq!(resv.node_count, 2);
    let bitmap = resv.node_bitmap.as_ref().unwrap();
    assert!(bitmap.test(0) && bitmap.test(1) && bitmap.count() == 2);

    assert_eq!(f.sink.count("modify"), 1);
}

#[test]
fn test_update_errors() {
    let mut f = fixture();
    f.manager.create_resv(&request("r1", "acctA", "tux0", NOW + HOUR, 1), &f.cluster).unwrap();

    assert!(matches!(f.manager.update_resv(&UpdateReservationRequest::new("nosuch"), &f.cluster), Err(Error::ReservationInvalid(_))));

    let mut backwards = UpdateReservationRequest::new("r1");
    backwards.end_time = Some(NOW + 30 * 60);
    assert!(matches!(f.manager.update_resv(&backwards, &f.cluster), Err(Error::InvalidTimeValue(_))));

    let mut no_nodes = UpdateReservationRequest::new("r1");
    no_nodes.node_count = Some(0);
    assert!(matches!(f.manager.update_resv(&no_nodes, &f.cluster), Err(Error::InvalidNodeName(_))));

    let mut bad_partition = UpdateReservationRequest::new("r1");
    bad_partition.partition = Some("nosuch".to_string());
    assert!(matches!(f.manager.update_resv(&bad_partition, &f.cluster), Err(Error::InvalidPartitionName(_))));

    let resv = f.manager.get("r1").unwrap();
    assert_eq!(resv.end_time, NOW + 2 * HOUR);
    assert_eq!(resv.node_count, 1);
}

#[test]
fn test_resize_shrink_drops_idle_nodes_first() {
    let mut f = fixture();
    f.manager.create_resv(&request("r1", "acctA", "tux[0-3]", NOW + HOUR, 1), &f.cluster).unwrap();
    f.cluster.set_node_state("tux1", NodeState::Allocated).unwrap();

    let mut update = UpdateReservationRequest::new("r1");
    update.node_count = Some(2);
    f.manager.update_resv(&update, &f.cluster).unwrap();

    let resv = f.manager.get("r1").unwrap();
    assert_eq!(resv.node_count, 2);
    assert_eq!(resv.node_list.as_deref(), Some("tux[1,3]"));
    assert_eq!(resv.cpu_count, 16);
}

#[test]
fn test_resize_shrink_below_idle_count() {
    let mut f = fixture();
    f.manager.create_resv(&request("r1", "acctA", "tux[0-3]", NOW + HOUR, 1), &f.cluster).unwrap();
    for node in ["tux0", "tux1", "tux2"] {
        f.cluster.set_node_state(node, NodeState::Mixed).unwrap();
    }

    let mut update = UpdateReservationRequest::new("r1");
    update.node_count = Some(1);
    f.manager.update_resv(&update, &f.cluster).unwrap();

    let resv = f.manager.get("r1").unwrap();
    assert_eq!(resv.node_count, 1);
    assert_eq!(resv.node_list.as_deref(), Some("tux0"));
}

#[test]
fn test_resize_grow_avoids_reserved_nodes() {
    let mut f = fixture();
    f.manager.create_resv(&request("r1", "acctA", "tux[0-1]", NOW + HOUR, 1), &f.cluster).unwrap();
    f.manager.create_resv(&request("r2", "acctB", "tux[2-3]", NOW + HOUR, 1), &f.cluster).unwrap();

    let mut update = UpdateReservationRequest::new("r1");
    update.node_count = Some(4);
    f.manager.update_resv(&update, &f.cluster).unwrap();

    let resv = f.manager.get("r1").unwrap();
    assert_eq!(resv.node_count, 4);
    assert_eq!(resv.node_list.as_deref(), Some("tux[0-1,4-5]"));
    assert_eq!(resv.cpu_count, 32);

    let mut too_big = UpdateReservationRequest::new("r1");
    too_big.node_count = Some(7);
    assert!(matches!(f.manager.update_resv(&too_big, &f.cluster), Err(Error::TooManyRequestedNodes { .. })));
    assert_eq!(f.manager.get("r1").unwrap().node_count, 4);
}

#[test]
fn test_delete_busy_then_free() {
    let mut f = fixture();
    f.manager.create_resv(&request("r1", "acctA", "tux0", NOW + HOUR, 1), &f.cluster).unwrap();
    let resv_id = f.manager.get("r1").unwrap().resv_id;

    let mut jobs = JobTable::new();
    let mut job = JobRecord::new(10, ALICE).with_account("acctA").with_reservation("r1").with_state(JobState::Running);
    job.resv_id = resv_id;
    jobs.insert(job);

    let err = f.manager.delete_resv("r1", &jobs).unwrap_err();
    assert!(matches!(err, Error::ReservationBusy(_)));
    assert_eq!(err.code(), ErrorCode::ReservationBusy);
    assert!(f.manager.get("r1").is_some());

    jobs.set_state(10, JobState::Completed);
    f.manager.delete_resv("r1", &jobs).unwrap();
    assert!(f.manager.get("r1").is_none());

    let (event, record) = f.sink.events().pop().unwrap();
    assert_eq!(event, "remove");
    assert_eq!(record.id, resv_id);
    assert_eq!(record.time_start_prev, NOW);

    assert!(matches!(f.manager.delete_resv("r1", &jobs), Err(Error::ReservationInvalid(_))));
}

#[test]
fn test_show_lists_reservations_in_creation_order() {
    let mut f = fixture();
    f.manager.create_resv(&request("zeta", "acctA", "tux0", NOW + HOUR, 1), &f.cluster).unwrap();
    let mut with_users = request("alpha", "acctB", "tux1", NOW + HOUR, 1);
    with_users.users = Some("bob".to_string());
    with_users.flags = ReservationFlags { maint: true, ..Default::default() };
    f.manager.create_resv(&with_users, &f.cluster).unwrap();

    let show = decode_show_buffer(&f.manager.show_resv().unwrap()).unwrap();
    assert_eq!(show.snapshot_time, NOW);
    let names: Vec<_> = show.reservations.iter().map(|info| info.name.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha"]);

    let alpha = &show.reservations[1];
    assert_eq!(alpha.users.as_deref(), Some("bob"));
    assert_eq!(alpha.accounts.as_deref(), Some("acctB"));
    assert_eq!(alpha.node_list.as_deref(), Some("tux1"));
    assert_eq!(ReservationFlags::from_bits(alpha.flags), ReservationFlags { maint: true, ..Default::default() });
}
