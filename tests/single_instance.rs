use std::time::Duration;

use examdesk_rust::db::models::{Exam, Question, Student};
use examdesk_rust::services::LocalDesk;
use examdesk_rust::session::{
    start_session, BroadcastHub, ChannelSupport, FullscreenCapability, IntegrityConfig,
    SessionDeps, SessionError, SessionEvent, TabId,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

fn history_exam() -> Exam {
    Exam {
        id: String::new(),
        teacher_id: "teacher-3".into(),
        subject: "History".into(),
        title: "Sukhothai".into(),
        questions: (0..4)
            .map(|index| Question {
                id: format!("his-{index}"),
                question_text: format!("Event {index}"),
                options: ["1238".into(), "1350".into(), "1767".into(), "1782".into()],
                correct_answer_index: 0,
            })
            .collect(),
        total_questions: 4,
        time_limit: 15,
        min_submit_time: 0,
        is_active: true,
        exam_code: "HIS101".into(),
        require_fullscreen: false,
        restricted_room: None,
        restricted_grade: None,
        school_name: None,
    }
}

fn student() -> Student {
    Student {
        prefix: "ด.ญ.".into(),
        first_name: "Ploy".into(),
        last_name: "Chai".into(),
        grade: "M.2".into(),
        room: "2/4".into(),
        number: "21".into(),
    }
}

fn tab(desk: &LocalDesk, exam: &Exam, hub: &BroadcastHub, channel_name: &str) -> SessionDeps {
    SessionDeps {
        sink: desk.result_sink(),
        exam_active: desk.watch_exam_active(exam),
        channel: ChannelSupport::Available(Box::new(hub.open(channel_name))),
        fullscreen: FullscreenCapability::Unsupported,
        integrity: IntegrityConfig::default(),
        initial_width: 1280,
        rng: StdRng::seed_from_u64(3),
        tab_id: TabId::new(),
    }
}

fn saw_duplicate(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> bool {
    let mut seen = false;
    while let Ok(event) = events.try_recv() {
        seen |= event == SessionEvent::DuplicateSession;
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn reopened_exam_tab_is_frozen() {
    let desk = LocalDesk::in_memory();
    let exam = desk.publish_exam(history_exam()).await.expect("publish");
    let hub = BroadcastHub::new();

    let (first, mut first_events) =
        start_session(exam.clone(), student(), tab(&desk, &exam, &hub, "examdesk-session"))
            .expect("first tab");
    first.snapshot().await.expect("first tab mounted");

    let (second, _second_events) =
        start_session(exam.clone(), student(), tab(&desk, &exam, &hub, "examdesk-session"))
            .expect("second tab");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let frozen = second.snapshot().await.expect("snapshot");
    assert!(frozen.duplicate);
    assert_eq!(second.select_displayed(1).await, Err(SessionError::DuplicateSession));

    assert!(!first.snapshot().await.expect("snapshot").duplicate);
    assert!(!saw_duplicate(&mut first_events));
    assert!(first.select_displayed(1).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn tabs_on_different_channels_do_not_interfere() {
    let desk = LocalDesk::in_memory();
    let exam = desk.publish_exam(history_exam()).await.expect("publish");
    let hub = BroadcastHub::new();

    let (first, _first_events) =
        start_session(exam.clone(), student(), tab(&desk, &exam, &hub, "room-2-4"))
            .expect("first tab");
    first.snapshot().await.expect("first tab mounted");

    let (second, mut second_events) =
        start_session(exam.clone(), student(), tab(&desk, &exam, &hub, "room-2-5"))
            .expect("second tab");
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(!second.snapshot().await.expect("snapshot").duplicate);
    assert!(!saw_duplicate(&mut second_events));
    assert!(second.select_displayed(1).await.is_ok());
}
