mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use intellimark_backend::{
    dto::{
        assessment_dto::CorrectResultRequest,
        identity_dto::{CreateCourseRequest, CreateLecturerRequest, CreateStudentRequest, CreateUnitRequest},
    },
    error::{AiError, Error},
    models::{
        assessment::{AssessmentDraft, AssessmentKind},
        question::QuestionType,
        user::{Role, Student},
    },
    routes,
    services::answer_service::RawAnswer,
    AppState,
};

use common::{database, send, token_for, unique_email, FakeCompletion};

struct Classroom {
    lecturer_user: Uuid,
    unit_id: Uuid,
    student: Student,
}

async fn classroom(state: &AppState) -> Classroom {
    let (lecturer, _) = state
        .user_service
        .create_lecturer(CreateLecturerRequest {
            email: unique_email("lecturer"),
            firstname: "Ada".into(),
            surname: "Lovelace".into(),
            othernames: None,
        })
        .await
        .expect("lecturer");
    let lecturer_user = lecturer.lecturer.user_id;

    let course = state
        .course_service
        .create_course(
            lecturer_user,
            CreateCourseRequest {
                code: format!("CS{}", &Uuid::new_v4().simple().to_string()[..6]),
                name: "Computer Science".into(),
                department: "Computing".into(),
                school: "Engineering".into(),
            },
        )
        .await
        .expect("course");
    let unit = state
        .course_service
        .create_unit(
            lecturer_user,
            CreateUnitRequest {
                course_id: course.id,
                unit_code: "CS201".into(),
                unit_name: "Operating Systems".into(),
                level: 2,
                semester: 1,
            },
        )
        .await
        .expect("unit");

    let student = state
        .user_service
        .create_student(
            lecturer_user,
            CreateStudentRequest {
                email: unique_email("student"),
                registration_number: format!("REG/{}", Uuid::new_v4().simple()),
                firstname: "Grace".into(),
                surname: "Hopper".into(),
                othernames: None,
                year_of_study: Some(2),
                semester: Some(1),
                unit_id: Some(unit.id),
            },
        )
        .await
        .expect("student")
        .student;

    Classroom {
        lecturer_user,
        unit_id: unit.id,
        student,
    }
}

fn draft(unit_id: Uuid) -> AssessmentDraft {
    AssessmentDraft {
        unit_id,
        title: "Processes and threads".into(),
        description: "Week three CAT".into(),
        topic: "Scheduling".into(),
        kind: AssessmentKind::Cat,
        questions_type: vec![QuestionType::OpenEnded, QuestionType::MultipleSingle],
        total_marks: 10.0,
        number_of_questions: 2,
        difficulty: "Intermediate".into(),
        blooms_level: None,
        week: Some(3),
        schedule_date: None,
        deadline: None,
        duration_minutes: Some(30),
    }
}

fn text(answer: &str) -> RawAnswer {
    RawAnswer {
        answer_type: Some("text".into()),
        text_answer: Some(answer.into()),
        image: None,
    }
}

#[tokio::test]
async fn generated_assessment_runs_from_answers_to_corrected_totals() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let generated = json!({
        "questions": [
            {
                "text": "Explain what a context switch is.",
                "marks": 5,
                "type": "open-ended",
                "rubric": "Mentions saving and restoring CPU state",
                "correct_answer": "Saving one process's state and loading another's"
            },
            {
                "text": "Which scheduler is preemptive?",
                "marks": 5,
                "type": "close-ended-multiple-single",
                "choices": ["FCFS", "Round robin"],
                "correct_answer": ["Round robin"],
                "rubric": "Round robin"
            }
        ]
    });
    let fake = FakeCompletion::replying(vec![
        Ok(generated.to_string()),
        Ok(r#"{"score": 3, "feedback": "Mostly right"}"#.into()),
        Ok("```json\n{\"score\": \"2\", \"feedback\": \"Partly\"}\n```".into()),
    ]);
    let state = AppState::with_completion_client(pool.clone(), fake.clone());
    let room = classroom(&state).await;

    let (assessment, questions) = state
        .assessment_service
        .generate_assessment(room.lecturer_user, draft(room.unit_id), None)
        .await
        .expect("generated");
    assert_eq!(questions.len(), 2);
    assert!(!assessment.verified);
    assert_eq!(questions[1].choices.as_ref().map(|c| c.0.len()), Some(2));

    let err = state
        .answer_service
        .submit_answer(&room.student, questions[0].id, text("too early"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    state
        .assessment_service
        .verify_assessment(room.lecturer_user, assessment.id)
        .await
        .expect("verify");
    let listed = state
        .assessment_service
        .list_student_assessments(&room.student)
        .await
        .expect("student listing");
    assert!(listed.iter().any(|v| v.assessment.id == assessment.id));

    let first = state
        .answer_service
        .submit_answer(&room.student, questions[0].id, text("The CPU state is swapped"))
        .await
        .expect("first answer");
    assert_eq!(first.score, 3.0);

    let duplicate = state
        .answer_service
        .submit_answer(&room.student, questions[0].id, text("again"))
        .await
        .unwrap_err();
    assert!(matches!(duplicate, Error::Conflict(_)));

    let second = state
        .answer_service
        .submit_answer(&room.student, questions[1].id, text("Round robin"))
        .await
        .expect("second answer");
    assert_eq!(second.score, 2.0);
    assert_eq!(fake.prompts.lock().unwrap().len(), 3);

    let submission = state
        .submission_service
        .finalize_submission(&room.student, assessment.id)
        .await
        .expect("submit");
    assert_eq!(submission.total_marks, 5.0);

    let again = state
        .submission_service
        .finalize_submission(&room.student, assessment.id)
        .await
        .unwrap_err();
    assert!(matches!(again, Error::Conflict(_)));

    let results = state
        .submission_service
        .get_student_results(&room.student, assessment.id)
        .await
        .expect("results");
    assert_eq!(results.len(), 2);

    let too_high = state
        .submission_service
        .correct_result(
            room.lecturer_user,
            results[1].result_id,
            CorrectResultRequest {
                score: 6.0,
                feedback: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(too_high, Error::BadRequest(_)));

    state
        .submission_service
        .correct_result(
            room.lecturer_user,
            results[1].result_id,
            CorrectResultRequest {
                score: 4.0,
                feedback: Some("Reviewed".into()),
            },
        )
        .await
        .expect("correction");

    let (_, rows) = state
        .submission_service
        .list_assessment_results(room.lecturer_user, assessment.id)
        .await
        .expect("lecturer results");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_marks, Some(7.0));

    state
        .assessment_service
        .delete_assessment(room.lecturer_user, assessment.id)
        .await
        .expect("delete");
    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM results WHERE assessment_id = $1")
        .bind(assessment.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn failed_generation_stores_nothing() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let fake = FakeCompletion::replying(vec![Ok("I cannot help with that".into())]);
    let state = AppState::with_completion_client(pool.clone(), fake);
    let room = classroom(&state).await;

    let err = state
        .assessment_service
        .generate_assessment(room.lecturer_user, draft(room.unit_id), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Generation(AiError::InvalidJson(_))));

    let stored = state
        .assessment_service
        .list_lecturer_assessments(room.lecturer_user)
        .await
        .unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn grading_failure_keeps_the_answer_without_a_result() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let fake = FakeCompletion::replying(vec![Ok(r#"{"score": 99, "feedback": "Generous"}"#.into())]);
    let state = AppState::with_completion_client(pool.clone(), fake);
    let room = classroom(&state).await;

    let questions = vec![intellimark_backend::dto::assessment_dto::QuestionPayload {
        text: "Define a deadlock.".into(),
        marks: 4.0,
        question_type: "open-ended".into(),
        rubric: Some("Circular wait".into()),
        correct_answer: None,
        choices: None,
    }
    .into_new_question()
    .unwrap()];
    let (assessment, questions) = state
        .assessment_service
        .create_assessment(room.lecturer_user, draft(room.unit_id), questions)
        .await
        .expect("create");
    state
        .assessment_service
        .verify_assessment(room.lecturer_user, assessment.id)
        .await
        .unwrap();

    let err = state
        .answer_service
        .submit_answer(&room.student, questions[0].id, text("Processes wait on each other"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Grading(AiError::ScoreOutOfBounds { .. })
    ));

    let answers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM answers WHERE question_id = $1")
        .bind(questions[0].id)
        .fetch_one(&pool)
        .await
        .unwrap();
    let results: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM results WHERE question_id = $1")
        .bind(questions[0].id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!((answers, results), (1, 0));
}

#[tokio::test]
async fn students_outside_the_unit_cannot_answer() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let state = AppState::with_completion_client(pool, FakeCompletion::replying(vec![]));
    let room = classroom(&state).await;
    let other = classroom(&state).await;

    let questions = vec![intellimark_backend::dto::assessment_dto::QuestionPayload {
        text: "Is paging a memory scheme?".into(),
        marks: 1.0,
        question_type: "close-ended-bool".into(),
        rubric: None,
        correct_answer: None,
        choices: Some(vec!["True".into(), "False".into()]),
    }
    .into_new_question()
    .unwrap()];
    let (assessment, questions) = state
        .assessment_service
        .create_assessment(room.lecturer_user, draft(room.unit_id), questions)
        .await
        .unwrap();
    state
        .assessment_service
        .verify_assessment(room.lecturer_user, assessment.id)
        .await
        .unwrap();

    let err = state
        .answer_service
        .submit_answer(&other.student, questions[0].id, text("True"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
}

fn png() -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::new_rgb8(4, 4)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[tokio::test]
async fn answer_images_are_served_to_their_owner_and_lecturer() {
    let Some(pool) = database().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let fake = FakeCompletion::replying(vec![Ok(r#"{"score": 2, "feedback": "Neat sketch"}"#.into())]);
    let state = AppState::with_completion_client(pool.clone(), fake);
    let room = classroom(&state).await;
    let stranger = classroom(&state).await;

    let questions = vec![intellimark_backend::dto::assessment_dto::QuestionPayload {
        text: "Draw the process state diagram.".into(),
        marks: 3.0,
        question_type: "open-ended".into(),
        rubric: Some("Ready, running and blocked states".into()),
        correct_answer: None,
        choices: None,
    }
    .into_new_question()
    .unwrap()];
    let (assessment, questions) = state
        .assessment_service
        .create_assessment(room.lecturer_user, draft(room.unit_id), questions)
        .await
        .unwrap();
    state
        .assessment_service
        .verify_assessment(room.lecturer_user, assessment.id)
        .await
        .unwrap();

    let image = png();
    let graded = state
        .answer_service
        .submit_answer(
            &room.student,
            questions[0].id,
            RawAnswer {
                answer_type: Some("image".into()),
                text_answer: None,
                image: Some(("diagram.png".into(), image.clone())),
            },
        )
        .await
        .unwrap();
    let stored: String = sqlx::query_scalar("SELECT image_path FROM answers WHERE id = $1")
        .bind(graded.answer_id)
        .fetch_one(&pool)
        .await
        .unwrap();

    let app = routes::router(state.clone());
    let uri = format!("/api/v1/bd/answers/{}/image", graded.answer_id);
    for token in [
        token_for(room.student.user_id, Role::Student),
        token_for(room.lecturer_user, Role::Lecturer),
    ] {
        let request = Request::builder()
            .uri(&uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        assert_eq!(&bytes[..], &image[..]);
    }

    for token in [
        token_for(stranger.student.user_id, Role::Student),
        token_for(stranger.lecturer_user, Role::Lecturer),
    ] {
        let (status, _) = send(&app, "GET", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    state
        .assessment_service
        .delete_assessment(room.lecturer_user, assessment.id)
        .await
        .unwrap();
    assert!(!std::path::Path::new(&stored).exists());
    let (status, _) = send(
        &app,
        "GET",
        &uri,
        Some(&token_for(room.student.user_id, Role::Student)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
