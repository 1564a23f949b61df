mod test_support;

use serde_json::json;
use test_support::{admin_session, create_student, create_teacher, Sidecar, ADMIN_PASSWORD, ADMIN_USER};

struct Roster {
    own_class: i64,
    other_class: i64,
    own_student: i64,
    other_student: i64,
}

fn seed(sidecar: &mut Sidecar) -> Roster {
    let kim = create_teacher(sidecar, "kim01", "kim-pw", "김선생");
    create_teacher(sidecar, "lee02", "lee-pw", "이선생");
    let own_student = create_student(sidecar, "민준", "mj@school.kr");
    let other_student = create_student(sidecar, "서윤", "sy@school.kr");
    let own = sidecar.ok(
        "admin.classes.create",
        json!({
            "className": "중등 수학",
            "teacher": { "id": kim },
            "students": [{ "id": own_student }],
            "todos": [
                { "title": "단원평가", "date": "2024-05-02" },
                { "title": "보강", "date": "2024-05-16" },
                { "title": "방학식", "date": "2024-07-19" },
            ],
        }),
    );
    let other = sidecar.ok(
        "admin.classes.create",
        json!({
            "className": "중등 영어",
            "teacher": { "teacherId": "lee02" },
            "students": [{ "id": other_student }],
        }),
    );
    Roster {
        own_class: own["classId"].as_i64().expect("class id"),
        other_class: other["classId"].as_i64().expect("class id"),
        own_student,
        other_student,
    }
}

#[test]
fn teachers_only_see_their_own_classes() {
    let (_workspace, mut sidecar) = admin_session(json!({}));
    let roster = seed(&mut sidecar);

    // Admins see everything through the portal.
    let all = sidecar.ok("teacher.classes.list", json!({}));
    assert_eq!(all["classes"].as_array().expect("classes").len(), 2);

    sidecar.token = None;
    sidecar.login("kim01", "kim-pw", "teacher");

    let me = sidecar.ok("teacher.me", json!({}));
    assert_eq!(me["teacherId"], json!("kim01"));
    assert_eq!(me["name"], json!("김선생"));

    let mine = sidecar.ok("teacher.classes.list", json!({}));
    let classes = mine["classes"].as_array().expect("classes");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0]["classId"], json!(roster.own_class));

    sidecar.ok("teacher.classes.get", json!({ "classId": roster.own_class }));
    assert_eq!(
        sidecar.fail_code("teacher.classes.get", json!({ "classId": roster.other_class })),
        "not_found"
    );

    let students = sidecar.ok(
        "teacher.classes.students",
        json!({ "classId": roster.own_class }),
    );
    assert_eq!(students["students"][0]["id"], json!(roster.own_student));
    assert_eq!(students["students"][0]["email"], json!("mj@school.kr"));
    assert_eq!(
        sidecar.fail_code(
            "teacher.classes.students",
            json!({ "classId": roster.other_class })
        ),
        "not_found"
    );
}

#[test]
fn todos_by_month_group_days_and_marked_dates() {
    let (_workspace, mut sidecar) = admin_session(json!({}));
    let roster = seed(&mut sidecar);
    sidecar.token = None;
    sidecar.login("kim01", "kim-pw", "teacher");

    let may = sidecar.ok(
        "teacher.classes.todos",
        json!({ "classId": roster.own_class, "year": 2024, "month": 5 }),
    );
    assert_eq!(may["markedDates"], json!(["2024-05-02", "2024-05-16"]));
    assert_eq!(may["todos"].as_array().expect("todos").len(), 2);
    assert_eq!(may["days"]["2024-05-16"][0]["title"], json!("보강"));

    let empty = sidecar.ok(
        "teacher.classes.todos",
        json!({ "classId": roster.own_class, "year": 2024 }),
    );
    assert_eq!(empty, json!({ "todos": [], "days": {}, "markedDates": [] }));

    assert_eq!(
        sidecar.fail_code(
            "teacher.classes.todos",
            json!({ "classId": roster.own_class, "year": 2024, "month": 0 })
        ),
        "bad_params"
    );
}

#[test]
fn reports_are_stored_per_recipient_and_listed_newest_first() {
    let (_workspace, mut sidecar) = admin_session(json!({}));
    let roster = seed(&mut sidecar);
    sidecar.token = None;
    sidecar.login("kim01", "kim-pw", "teacher");

    let sent = sidecar.ok(
        "teacher.reports.send",
        json!({
            "common": { "subject": "5월 학습 안내", "content": "시험 범위 공지" },
            "recipients": [
                { "studentId": roster.own_student, "personalMessage": "잘하고 있어요" },
                { "studentId": 9999, "personalMessage": "없는 학생" },
            ],
        }),
    );
    assert_eq!(
        sent,
        json!({ "status": "success", "sentCommon": true, "sentIndividual": 1 })
    );

    let sent = sidecar.ok(
        "teacher.reports.send",
        json!({ "recipients": [{ "studentId": roster.own_student }] }),
    );
    assert_eq!(sent["sentCommon"], json!(false));
    assert_eq!(sent["sentIndividual"], json!(1));

    let list = sidecar.ok(
        "teacher.reports.list",
        json!({ "studentId": roster.own_student }),
    );
    let reports = list["reports"].as_array().expect("reports");
    assert_eq!(reports.len(), 2);
    assert!(reports[0]["id"].as_i64() > reports[1]["id"].as_i64());
    assert_eq!(reports[1]["common_subject"], json!("5월 학습 안내"));
    assert_eq!(reports[1]["personal_message"], json!("잘하고 있어요"));
    assert_eq!(reports[1]["student"]["name"], json!("민준"));

    // Reports for students outside the caller's classes stay hidden.
    sidecar.token = None;
    sidecar.login(ADMIN_USER, ADMIN_PASSWORD, "admin");
    sidecar.ok(
        "teacher.reports.send",
        json!({ "common": { "content": "영어반" }, "recipients": [{ "studentId": roster.other_student }] }),
    );
    let all = sidecar.ok("teacher.reports.list", json!({}));
    assert_eq!(all["reports"].as_array().expect("reports").len(), 3);

    sidecar.token = None;
    sidecar.login("kim01", "kim-pw", "teacher");
    let mine = sidecar.ok("teacher.reports.list", json!({}));
    assert_eq!(mine["reports"].as_array().expect("reports").len(), 2);
}

#[test]
fn admin_without_teacher_profile_gets_not_found_from_teacher_me() {
    let (_workspace, mut sidecar) = admin_session(json!({}));
    assert_eq!(sidecar.fail_code("teacher.me", json!({})), "not_found");
}
