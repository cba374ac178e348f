mod common;

use advance_reservation::domain::job::job::JobRecord;
use logtest::Logger;

use common::{CAROL, HOUR, NOW, fixture, request};

// Single test in this binary: the capturing logger is process global.
#[test]
fn test_access_denial_logged_as_security_violation() {
    let mut logger = Logger::start();
    let mut f = fixture();
    f.manager.create_resv(&request("secure", "acctA", "tux0", NOW + HOUR, 1), &f.cluster).unwrap();

    let mut job = JobRecord::new(42, CAROL).with_account("acctB").with_reservation("secure");
    assert!(f.manager.validate_job_resv(&mut job).is_err());

    let violation = logger.find(|record| record.level() == log::Level::Warn && record.args().contains("Security violation"));
    let violation = violation.expect("no security violation logged");
    assert!(violation.args().contains("uid=1003"));
    assert!(violation.args().contains("secure"));
}
