mod test_support;

use serde_json::json;
use test_support::{admin_session, create_teacher, ADMIN_PASSWORD, ADMIN_USER};

#[test]
fn teacher_roster_create_list_and_conflicts() {
    let (_workspace, mut sidecar) = admin_session(json!({}));

    let err = sidecar.fail(
        "admin.teachers.create",
        json!({ "teacherId": "lee02", "name": "이선생", "age": 40, "position": "영어", "sex": "M" }),
    );
    assert_eq!(err["code"], json!("validation_failed"));
    assert_eq!(
        err["details"]["passwd"],
        json!("Password is required for new teacher.")
    );

    let id = create_teacher(&mut sidecar, "lee02", "pw", "이선생");
    let list = sidecar.ok("admin.teachers.list", json!({}));
    assert_eq!(list["total_counts"], json!(1));
    let row = &list["teachers"][0];
    assert_eq!(row["id"], json!(id));
    assert_eq!(row["teacherId"], json!("lee02"));
    assert!(row.get("passwd").is_none());

    let err = sidecar.fail(
        "admin.teachers.create",
        json!({ "teacherId": "lee02", "passwd": "x", "name": "중복", "age": 30, "position": "국어", "sex": "F" }),
    );
    assert_eq!(err["code"], json!("conflict"));

    let err = sidecar.fail(
        "admin.teachers.create",
        json!({ "teacherId": "park03", "passwd": "x", "name": "박", "age": -3, "position": "국어", "sex": "F" }),
    );
    assert_eq!(err["code"], json!("validation_failed"));
}

#[test]
fn blank_password_on_update_keeps_the_old_one() {
    let (_workspace, mut sidecar) = admin_session(json!({}));
    let id = create_teacher(&mut sidecar, "choi04", "first-pw", "최선생");

    let updated = sidecar.ok(
        "admin.teachers.update",
        json!({ "id": id, "passwd": "", "position": "과학" }),
    );
    assert_eq!(updated["position"], json!("과학"));
    assert_eq!(updated["name"], json!("최선생"));

    sidecar.token = None;
    sidecar.login("choi04", "first-pw", "teacher");

    sidecar.token = None;
    sidecar.login(ADMIN_USER, ADMIN_PASSWORD, "admin");
    sidecar.ok(
        "admin.teachers.update",
        json!({ "id": id, "passwd": "second-pw" }),
    );

    sidecar.token = None;
    assert_eq!(
        sidecar.fail_code(
            "auth.login",
            json!({ "username": "choi04", "password": "first-pw", "role": "teacher" })
        ),
        "unauthorized"
    );
    sidecar.login("choi04", "second-pw", "teacher");
}

#[test]
fn deleting_a_teacher_keeps_their_classes() {
    let (_workspace, mut sidecar) = admin_session(json!({}));
    let id = create_teacher(&mut sidecar, "jung05", "pw", "정선생");
    let class = sidecar.ok(
        "admin.classes.create",
        json!({ "className": "중등 수학", "teacher": { "id": id }, "daysOfWeek": ["화"] }),
    );
    let class_id = class["classId"].as_i64().expect("class id");

    sidecar.ok("admin.teachers.delete", json!({ "id": id }));
    assert_eq!(
        sidecar.fail_code("admin.teachers.get", json!({ "id": id })),
        "not_found"
    );

    let class = sidecar.ok("admin.classes.get", json!({ "classId": class_id }));
    assert!(class["teacher"].is_null());
    assert_eq!(class["className"], json!("중등 수학"));
}
