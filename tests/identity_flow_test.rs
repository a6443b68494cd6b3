mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use intellimark_backend::{
    dto::{
        assessment_dto::QuestionPayload,
        auth_dto::RegisterStudentRequest,
        identity_dto::{CreateCourseRequest, CreateLecturerRequest, CreateStudentRequest, CreateUnitRequest},
    },
    error::Error,
    models::{
        assessment::{AssessmentDraft, AssessmentKind},
        course::{Course, Unit},
        question::QuestionType,
        user::{Role, Student},
    },
    routes,
    services::{answer_service::RawAnswer, auth_service::MAX_VERIFICATION_ATTEMPTS},
    AppState,
};

use common::{database, send, token_for, unique_email, FakeCompletion};

fn lecturer_request(email: &str) -> CreateLecturerRequest {
    CreateLecturerRequest {
        email: email.into(),
        firstname: "Edsger".into(),
        surname: "Dijkstra".into(),
        othernames: None,
    }
}

fn student_request(email: &str, registration_number: &str, unit_id: Option<Uuid>) -> CreateStudentRequest {
    CreateStudentRequest {
        email: email.into(),
        registration_number: registration_number.into(),
        firstname: "Frances".into(),
        surname: "Allen".into(),
        othernames: None,
        year_of_study: Some(1),
        semester: Some(1),
        unit_id,
    }
}

fn registration(email: &str, registration_number: &str) -> RegisterStudentRequest {
    RegisterStudentRequest {
        email: email.into(),
        password: "Sup3r$ecret".into(),
        registration_number: registration_number.into(),
        firstname: "Donald".into(),
        surname: "Knuth".into(),
        othernames: None,
        year_of_study: Some(1),
        semester: Some(1),
    }
}

fn registration_number() -> String {
    format!("REG/{}", Uuid::new_v4().simple())
}

async fn lecturer(state: &AppState) -> Uuid {
    state
        .user_service
        .create_lecturer(lecturer_request(&unique_email("identity_lecturer")))
        .await
        .expect("lecturer")
        .0
        .lecturer
        .user_id
}

async fn course_with_unit(state: &AppState, owner: Uuid) -> (Course, Unit) {
    let course = state
        .course_service
        .create_course(
            owner,
            CreateCourseRequest {
                code: format!("IS{}", &Uuid::new_v4().simple().to_string()[..6]),
                name: "Information Systems".into(),
                department: "Computing".into(),
                school: "Engineering".into(),
            },
        )
        .await
        .expect("course");
    let unit = state
        .course_service
        .create_unit(
            owner,
            CreateUnitRequest {
                course_id: course.id,
                unit_code: "IS101".into(),
                unit_name: "Databases".into(),
                level: 1,
                semester: 1,
            },
        )
        .await
        .expect("unit");
    (course, unit)
}

async fn enrolled_student(state: &AppState, owner: Uuid, unit_id: Option<Uuid>) -> Student {
    state
        .user_service
        .create_student(
            owner,
            student_request(&unique_email("identity_student"), &registration_number(), unit_id),
        )
        .await
        .expect("student")
        .student
}

fn draft(unit_id: Uuid) -> AssessmentDraft {
    AssessmentDraft {
        unit_id,
        title: "Normal forms".into(),
        description: "Week two quiz".into(),
        topic: "Normalisation".into(),
        kind: AssessmentKind::Cat,
        questions_type: vec![QuestionType::OpenEnded],
        total_marks: 4.0,
        number_of_questions: 1,
        difficulty: "Beginner".into(),
        blooms_level: None,
        week: Some(2),
        schedule_date: None,
        deadline: None,
        duration_minutes: None,
    }
}

fn open_question() -> QuestionPayload {
    QuestionPayload {
        text: "What does 3NF remove?".into(),
        marks: 4.0,
        question_type: "open-ended".into(),
        rubric: Some("Transitive dependencies".into()),
        correct_answer: None,
        choices: None,
    }
}

#[tokio::test]
async fn emails_are_unique_across_roles() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let state = AppState::with_completion_client(pool, FakeCompletion::replying(vec![]));
    let email = unique_email("taken");

    let owner = state
        .user_service
        .create_lecturer(lecturer_request(&email))
        .await
        .unwrap()
        .0
        .lecturer
        .user_id;

    let again = state.user_service.create_lecturer(lecturer_request(&email)).await;
    assert!(matches!(again, Err(Error::Conflict(_))));

    let as_student = state
        .user_service
        .create_student(owner, student_request(&email, &registration_number(), None))
        .await;
    assert!(matches!(as_student, Err(Error::Conflict(_))));

    let self_registered = state
        .auth_service
        .request_registration(registration(&email, &registration_number()))
        .await;
    assert!(matches!(self_registered, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn registration_numbers_are_unique() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let state = AppState::with_completion_client(pool, FakeCompletion::replying(vec![]));
    let owner = lecturer(&state).await;
    let reg = registration_number();

    state
        .user_service
        .create_student(owner, student_request(&unique_email("first"), &reg, None))
        .await
        .unwrap();

    let duplicate = state
        .user_service
        .create_student(owner, student_request(&unique_email("second"), &reg, None))
        .await;
    match duplicate {
        Err(Error::Conflict(msg)) => assert!(msg.contains("Registration number")),
        other => panic!("expected conflict, got {:?}", other.map(|a| a.student.id)),
    }

    let self_registered = state
        .auth_service
        .request_registration(registration(&unique_email("third"), &reg))
        .await;
    assert!(matches!(self_registered, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn unit_codes_are_unique_within_a_course() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let state = AppState::with_completion_client(pool, FakeCompletion::replying(vec![]));
    let owner = lecturer(&state).await;
    let (course, unit) = course_with_unit(&state, owner).await;

    let duplicate = state
        .course_service
        .create_unit(
            owner,
            CreateUnitRequest {
                course_id: course.id,
                unit_code: unit.unit_code.to_lowercase(),
                unit_name: "Databases again".into(),
                level: 1,
                semester: 2,
            },
        )
        .await;
    assert!(matches!(duplicate, Err(Error::Conflict(_))));

    let (other_course, _) = course_with_unit(&state, owner).await;
    assert_ne!(other_course.id, course.id);
}

#[tokio::test]
async fn rejoining_a_unit_is_rejected() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let state = AppState::with_completion_client(pool, FakeCompletion::replying(vec![]));
    let owner = lecturer(&state).await;
    let (_, unit) = course_with_unit(&state, owner).await;
    let student = enrolled_student(&state, owner, None).await;

    let app = routes::router(state);
    let token = token_for(student.user_id, Role::Student);
    let body = json!({ "join_code": unit.unique_join_code.to_lowercase() });

    let (status, joined) = send(&app, "POST", "/api/v1/student/units/join", Some(&token), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{}", joined);

    let (status, again) = send(&app, "POST", "/api/v1/student/units/join", Some(&token), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(again["message"].as_str().unwrap().contains("already registered"));

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/student/units/join",
        Some(&token),
        Some(json!({ "join_code": "NOSUCHCODE" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_course_removes_its_units() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let state = AppState::with_completion_client(pool, FakeCompletion::replying(vec![]));
    let owner = lecturer(&state).await;
    let (course, unit) = course_with_unit(&state, owner).await;

    let app = routes::router(state.clone());
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/v1/lecturer/courses/{}", course.id),
        Some(&token_for(owner, Role::Lecturer)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert!(matches!(state.course_service.get_course(course.id).await, Err(Error::NotFound(_))));
    assert!(matches!(state.course_service.get_unit(unit.id).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn deleting_a_student_removes_profile_answers_and_results() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let fake = FakeCompletion::replying(vec![Ok(r#"{"score": 3, "feedback": "Close"}"#.into())]);
    let state = AppState::with_completion_client(pool.clone(), fake);
    let owner = lecturer(&state).await;
    let (_, unit) = course_with_unit(&state, owner).await;
    let student = enrolled_student(&state, owner, Some(unit.id)).await;

    let (assessment, questions) = state
        .assessment_service
        .create_assessment(owner, draft(unit.id), vec![open_question().into_new_question().unwrap()])
        .await
        .unwrap();
    state
        .assessment_service
        .verify_assessment(owner, assessment.id)
        .await
        .unwrap();
    state
        .answer_service
        .submit_answer(
            &student,
            questions[0].id,
            RawAnswer {
                answer_type: Some("text".into()),
                text_answer: Some("Transitive dependencies".into()),
                image: None,
            },
        )
        .await
        .unwrap();

    state.user_service.delete_user(student.user_id).await.unwrap();

    let count = |sql: &'static str| {
        let pool = pool.clone();
        let id = student.id;
        async move { sqlx::query_scalar::<_, i64>(sql).bind(id).fetch_one(&pool).await.unwrap() }
    };
    assert_eq!(count("SELECT COUNT(*) FROM students WHERE id = $1").await, 0);
    assert_eq!(count("SELECT COUNT(*) FROM answers WHERE student_id = $1").await, 0);
    assert_eq!(count("SELECT COUNT(*) FROM results WHERE student_id = $1").await, 0);
    assert!(matches!(
        state.user_service.delete_user(student.user_id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn students_only_see_verified_assessments() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let state = AppState::with_completion_client(pool, FakeCompletion::replying(vec![]));
    let owner = lecturer(&state).await;
    let (_, unit) = course_with_unit(&state, owner).await;
    let student = enrolled_student(&state, owner, Some(unit.id)).await;

    let (assessment, _) = state
        .assessment_service
        .create_assessment(owner, draft(unit.id), vec![open_question().into_new_question().unwrap()])
        .await
        .unwrap();

    let visible = state
        .assessment_service
        .list_student_assessments(&student)
        .await
        .unwrap();
    assert!(visible.iter().all(|v| v.assessment.id != assessment.id));

    state
        .assessment_service
        .verify_assessment(owner, assessment.id)
        .await
        .unwrap();
    let visible = state
        .assessment_service
        .list_student_assessments(&student)
        .await
        .unwrap();
    assert!(visible.iter().any(|v| v.assessment.id == assessment.id));
}

#[tokio::test]
async fn verification_codes_stop_working_after_too_many_misses() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let state = AppState::with_completion_client(pool, FakeCompletion::replying(vec![]));
    let email = unique_email("guesser");

    let code = state
        .auth_service
        .request_registration(registration(&email, &registration_number()))
        .await
        .unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    for _ in 1..MAX_VERIFICATION_ATTEMPTS {
        match state.auth_service.verify_registration(&email, wrong).await {
            Err(Error::BadRequest(msg)) => assert_eq!(msg, "Invalid verification code"),
            other => panic!("expected bad request, got {:?}", other.map(|s| s.id)),
        }
    }
    match state.auth_service.verify_registration(&email, wrong).await {
        Err(Error::BadRequest(msg)) => assert!(msg.contains("Too many")),
        other => panic!("expected lockout, got {:?}", other.map(|s| s.id)),
    }
    match state.auth_service.verify_registration(&email, &code).await {
        Err(Error::BadRequest(msg)) => assert!(msg.contains("No pending registration")),
        other => panic!("expected no pending registration, got {:?}", other.map(|s| s.id)),
    }

    let code = state
        .auth_service
        .request_registration(registration(&email, &registration_number()))
        .await
        .unwrap();
    let student = state
        .auth_service
        .verify_registration(&email, &code)
        .await
        .unwrap();
    assert_eq!(student.firstname, "Donald");
}
