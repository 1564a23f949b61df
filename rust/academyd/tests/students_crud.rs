mod test_support;

use serde_json::json;
use test_support::{admin_session, create_student};

#[test]
fn student_create_validates_fields() {
    let (_workspace, mut sidecar) = admin_session(json!({}));

    let err = sidecar.fail(
        "admin.students.create",
        json!({ "name": "한결", "email": "not-an-email", "birth_date": "2012-01-01", "gender": "M" }),
    );
    assert_eq!(err["code"], json!("validation_failed"));
    assert!(err["details"]["email"].is_string());

    let err = sidecar.fail(
        "admin.students.create",
        json!({ "name": "한결", "email": "a@b.kr", "birth_date": "2012/01/01", "gender": "M" }),
    );
    assert!(err["details"]["birth_date"].is_string());

    let err = sidecar.fail(
        "admin.students.create",
        json!({ "name": "한결", "email": "a@b.kr", "birth_date": "2012-01-01", "gender": "M", "classId": 999 }),
    );
    assert_eq!(err["code"], json!("validation_failed"));
    assert_eq!(err["details"]["classId"], json!("Invalid Class ID"));

    let id = create_student(&mut sidecar, "한결", "hk@school.kr");
    let student = sidecar.ok("admin.students.get", json!({ "id": id }));
    assert!(student["class_id"].is_null());
    assert_eq!(student["birth_date"], json!("2012-03-04"));

    let list = sidecar.ok("admin.students.list", json!({}));
    assert_eq!(list["total_counts"], json!(1));
}

#[test]
fn class_link_follows_blank_null_and_absent_rules() {
    let (_workspace, mut sidecar) = admin_session(json!({}));
    let class = sidecar.ok("admin.classes.create", json!({ "className": "초등 영어" }));
    let class_id = class["classId"].as_i64().expect("class id");
    let id = create_student(&mut sidecar, "서연", "sy@school.kr");

    let s = sidecar.ok(
        "admin.students.update",
        json!({ "id": id, "classId": class_id.to_string() }),
    );
    assert_eq!(s["class_id"], json!(class_id));

    // Absent and null leave the link alone.
    let s = sidecar.ok("admin.students.update", json!({ "id": id, "name": "서연2" }));
    assert_eq!(s["class_id"], json!(class_id));
    let s = sidecar.ok("admin.students.update", json!({ "id": id, "classId": null }));
    assert_eq!(s["class_id"], json!(class_id));

    let s = sidecar.ok("admin.students.update", json!({ "id": id, "class_id": "" }));
    assert!(s["class_id"].is_null());
    assert_eq!(s["name"], json!("서연2"));

    assert_eq!(
        sidecar.fail_code("admin.students.update", json!({ "id": id, "classId": "abc" })),
        "validation_failed"
    );
}

#[test]
fn deleting_a_student_removes_their_reports() {
    let (_workspace, mut sidecar) = admin_session(json!({}));
    let id = create_student(&mut sidecar, "지우", "jw@school.kr");
    let sent = sidecar.ok(
        "teacher.reports.send",
        json!({ "common": { "subject": "안내" }, "recipients": [{ "studentId": id }] }),
    );
    assert_eq!(sent["sentIndividual"], json!(1));

    sidecar.ok("admin.students.delete", json!({ "id": id }));
    let reports = sidecar.ok("teacher.reports.list", json!({}));
    assert!(reports["reports"].as_array().expect("reports").is_empty());
    assert_eq!(
        sidecar.fail_code("admin.students.delete", json!({ "id": id })),
        "not_found"
    );
}
