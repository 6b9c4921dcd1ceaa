use std::collections::HashMap;

use rand::rngs::StdRng;
use serde::Serialize;

use crate::db::models::{Exam, ExamResult, Question, Student, StudentAnswer, OPTION_COUNT};
use crate::session::integrity::ViolationKind;
use crate::session::shuffle;
use crate::session::submission::{score_answers, ResultDraft, SubmitTrigger};
use crate::session::SessionError;

/// Labels shown next to the displayed options, in display order.
pub const OPTION_LABELS: [&str; OPTION_COUNT] = ["ก", "ข", "ค", "ง"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "kind", rename_all = "snake_case")]
pub enum RestartReason {
    Violation(ViolationKind),
    FullscreenExit,
}

impl RestartReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Violation(_) => "violation",
            Self::FullscreenExit => "fullscreen_exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "trigger", rename_all = "snake_case")]
pub enum SessionPhase {
    Live,
    Submitting(SubmitTrigger),
    SubmitFailed,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running { time_remaining_seconds: u32 },
    /// The countdown just reached zero; an automatic submission is due.
    Expired,
    /// Nothing to count: the attempt is no longer live.
    Idle,
}

/// Everything one draw of the exam produced. Replaced as a whole on restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    selected_questions: Vec<Question>,
    option_orders: HashMap<String, [u8; OPTION_COUNT]>,
    answers: Vec<StudentAnswer>,
    time_remaining_seconds: u32,
    position: usize,
}

impl Attempt {
    fn draw(exam: &Exam, rng: &mut StdRng) -> Self {
        let count = (exam.total_questions as usize).min(exam.questions.len());
        let selected_questions = shuffle::draw_questions(&exam.questions, count, rng);
        let option_orders = selected_questions
            .iter()
            .map(|question| (question.id.clone(), shuffle::option_order(rng)))
            .collect();
        let answers = selected_questions
            .iter()
            .map(|question| StudentAnswer::unanswered(question.id.clone()))
            .collect();

        Self {
            selected_questions,
            option_orders,
            answers,
            time_remaining_seconds: exam.time_limit_seconds(),
            position: 0,
        }
    }

    pub fn selected_questions(&self) -> &[Question] {
        &self.selected_questions
    }

    pub fn option_order(&self, question_id: &str) -> Option<[u8; OPTION_COUNT]> {
        self.option_orders.get(question_id).copied()
    }

    pub fn answers(&self) -> &[StudentAnswer] {
        &self.answers
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|answer| answer.selected_answer_index.is_some()).count()
    }

    pub fn time_remaining_seconds(&self) -> u32 {
        self.time_remaining_seconds
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceView {
    pub label: &'static str,
    pub text: String,
    pub original_index: u8,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub choices: Vec<ChoiceView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmitAvailability {
    Open,
    /// Whole minutes left before a manual submission is accepted, rounded up.
    Locked { minutes_left: u32 },
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub exam_title: String,
    pub student_name: String,
    pub position: usize,
    pub question_count: usize,
    pub question: QuestionView,
    pub answered: bool,
    pub answered_count: usize,
    pub can_advance: bool,
    pub can_retreat: bool,
    pub time_remaining_seconds: u32,
    pub submit: SubmitAvailability,
    pub confirming: bool,
    pub phase: SessionPhase,
    pub restarts: u32,
}

/// One student's attempt at one exam.
///
/// Construction is the one-time initialization; there is no way to hold an
/// uninitialized session. The answer key is the exam captured here and is
/// never re-read.
#[derive(Debug)]
pub struct ExamSession {
    exam: Exam,
    student: Student,
    rng: StdRng,
    attempt: Attempt,
    phase: SessionPhase,
    confirming: bool,
    restarts: u32,
}

impl ExamSession {
    pub fn start(exam: Exam, student: Student, mut rng: StdRng) -> Result<Self, SessionError> {
        if !exam.is_active {
            return Err(SessionError::ExamInactive);
        }
        if student.first_name.trim().is_empty() || student.last_name.trim().is_empty() {
            return Err(SessionError::MissingStudent);
        }
        exam.validate_key()?;

        if exam.total_questions as usize > exam.questions.len() {
            tracing::warn!(
                exam_id = %exam.id,
                total_questions = exam.total_questions,
                bank_size = exam.questions.len(),
                "Exam asks for more questions than its bank holds; drawing the whole bank"
            );
        }

        let attempt = Attempt::draw(&exam, &mut rng);
        tracing::info!(
            exam_id = %exam.id,
            student = %student.display_name(),
            questions = attempt.selected_questions.len(),
            time_limit_seconds = attempt.time_remaining_seconds,
            "Exam session started"
        );

        Ok(Self {
            exam,
            student,
            rng,
            attempt,
            phase: SessionPhase::Live,
            confirming: false,
            restarts: 0,
        })
    }

    pub fn exam(&self) -> &Exam {
        &self.exam
    }

    pub fn student(&self) -> &Student {
        &self.student
    }

    pub fn attempt(&self) -> &Attempt {
        &self.attempt
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn is_live(&self) -> bool {
        self.phase == SessionPhase::Live
    }

    pub fn is_confirming(&self) -> bool {
        self.confirming
    }

    /// Throws away the attempt and draws a fresh one with a full timer.
    /// Returns `false` once submission has been claimed.
    pub fn restart(&mut self, reason: RestartReason) -> bool {
        if !self.is_live() {
            return false;
        }

        self.attempt = Attempt::draw(&self.exam, &mut self.rng);
        self.confirming = false;
        self.restarts += 1;

        tracing::warn!(
            exam_id = %self.exam.id,
            reason = reason.as_str(),
            restarts = self.restarts,
            "Exam session restarted"
        );
        true
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.attempt.selected_questions.get(self.attempt.position)
    }

    pub fn select_answer(
        &mut self,
        question_id: &str,
        original_index: u8,
    ) -> Result<(), SessionError> {
        self.ensure_live()?;
        if usize::from(original_index) >= OPTION_COUNT {
            return Err(SessionError::InvalidOption(usize::from(original_index)));
        }

        let position = self.attempt.position;
        match self.attempt.selected_questions.get(position) {
            Some(question) if question.id == question_id => {}
            _ => return Err(SessionError::NotCurrentQuestion(question_id.to_string())),
        }

        self.attempt.answers[position].selected_answer_index = Some(original_index);
        Ok(())
    }

    /// Selects by on-screen position; returns the original option index chosen.
    pub fn select_displayed(&mut self, display_index: usize) -> Result<u8, SessionError> {
        self.ensure_live()?;
        let question_id = self
            .current_question()
            .map(|question| question.id.clone())
            .ok_or(SessionError::Closed)?;
        let order = self
            .attempt
            .option_order(&question_id)
            .ok_or_else(|| SessionError::NotCurrentQuestion(question_id.clone()))?;
        let original = *order.get(display_index).ok_or(SessionError::InvalidOption(display_index))?;

        self.select_answer(&question_id, original)?;
        Ok(original)
    }

    pub fn advance(&mut self) -> Result<usize, SessionError> {
        self.ensure_live()?;
        let position = self.attempt.position;
        let answered =
            self.attempt.answers.get(position).and_then(|answer| answer.selected_answer_index);
        if answered.is_none() {
            return Err(SessionError::Unanswered);
        }
        if position + 1 < self.attempt.selected_questions.len() {
            self.attempt.position = position + 1;
        }
        Ok(self.attempt.position)
    }

    pub fn retreat(&mut self) -> Result<usize, SessionError> {
        self.ensure_live()?;
        self.attempt.position = self.attempt.position.saturating_sub(1);
        Ok(self.attempt.position)
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_live() {
            return TickOutcome::Idle;
        }

        self.attempt.time_remaining_seconds = self.attempt.time_remaining_seconds.saturating_sub(1);
        match self.attempt.time_remaining_seconds {
            0 => TickOutcome::Expired,
            time_remaining_seconds => TickOutcome::Running { time_remaining_seconds },
        }
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.exam.time_limit_seconds().saturating_sub(self.attempt.time_remaining_seconds)
    }

    /// Seconds until a manual submission is accepted; zero when open.
    pub fn submit_lock_seconds(&self) -> u32 {
        self.exam.min_submit_seconds().saturating_sub(self.elapsed_seconds())
    }

    pub fn request_submit(&mut self) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.ensure_submit_open()?;
        self.confirming = true;
        Ok(())
    }

    pub fn cancel_submit(&mut self) {
        self.confirming = false;
    }

    pub fn confirm_submit(&mut self) -> Result<ResultDraft, SessionError> {
        self.ensure_live()?;
        if !self.confirming {
            return Err(SessionError::NotConfirming);
        }
        self.claim_submission(SubmitTrigger::Manual)
    }

    /// The single check-and-set guarding scoring. Exactly one claim succeeds
    /// per write attempt; a failed write re-opens the claim for manual retry.
    pub fn claim_submission(
        &mut self,
        trigger: SubmitTrigger,
    ) -> Result<ResultDraft, SessionError> {
        match (self.phase, trigger) {
            (SessionPhase::Live, SubmitTrigger::Manual) => self.ensure_submit_open()?,
            (SessionPhase::Live, _) => {}
            (SessionPhase::SubmitFailed, SubmitTrigger::Manual) => {}
            (SessionPhase::SubmitFailed, _) => return Err(SessionError::AlreadyClaimed),
            (SessionPhase::Submitting(_) | SessionPhase::Submitted, _) => {
                return Err(SessionError::AlreadyClaimed);
            }
        }

        self.phase = SessionPhase::Submitting(trigger);
        self.confirming = false;

        let answers = self.attempt.answers.clone();
        let score = score_answers(&self.exam, &answers);
        Ok(ResultDraft {
            exam_id: self.exam.id.clone(),
            student: self.student.clone(),
            score,
            total: self.exam.total_questions,
            answers,
            trigger,
        })
    }

    /// The write did not land. Answers stay as they were.
    pub fn submission_failed(&mut self) {
        if matches!(self.phase, SessionPhase::Submitting(_)) {
            self.phase = SessionPhase::SubmitFailed;
        }
    }

    pub fn mark_submitted(&mut self, result: &ExamResult) {
        self.phase = SessionPhase::Submitted;
        tracing::info!(
            exam_id = %self.exam.id,
            result_id = %result.id,
            score = result.score,
            total = result.total,
            "Exam session submitted"
        );
    }

    pub fn view(&self) -> SessionView {
        let attempt = &self.attempt;
        let position = attempt.position;
        let selected =
            attempt.answers.get(position).and_then(|answer| answer.selected_answer_index);

        let question = match self.current_question() {
            Some(question) => {
                let order = attempt.option_order(&question.id).unwrap_or([0, 1, 2, 3]);
                let choices = order
                    .iter()
                    .zip(OPTION_LABELS)
                    .map(|(&original_index, label)| ChoiceView {
                        label,
                        text: question.options[usize::from(original_index)].clone(),
                        original_index,
                        selected: selected == Some(original_index),
                    })
                    .collect();
                QuestionView {
                    id: question.id.clone(),
                    text: question.question_text.clone(),
                    choices,
                }
            }
            None => QuestionView { id: String::new(), text: String::new(), choices: Vec::new() },
        };

        // A failed write can always be retried; the minimum time only gates the first try.
        let submit = match self.phase {
            SessionPhase::SubmitFailed => SubmitAvailability::Open,
            _ if !self.is_live() => SubmitAvailability::Closed,
            _ => match self.submit_lock_seconds() {
                0 => SubmitAvailability::Open,
                seconds => SubmitAvailability::Locked { minutes_left: seconds.div_ceil(60) },
            },
        };

        SessionView {
            exam_title: self.exam.title.clone(),
            student_name: self.student.display_name(),
            position,
            question_count: attempt.selected_questions.len(),
            question,
            answered: selected.is_some(),
            answered_count: attempt.answered_count(),
            can_advance: selected.is_some() && position + 1 < attempt.selected_questions.len(),
            can_retreat: position > 0,
            time_remaining_seconds: attempt.time_remaining_seconds,
            submit,
            confirming: self.confirming,
            phase: self.phase,
            restarts: self.restarts,
        }
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Live => Ok(()),
            _ => Err(SessionError::AlreadyClaimed),
        }
    }

    fn ensure_submit_open(&self) -> Result<(), SessionError> {
        match self.submit_lock_seconds() {
            0 => Ok(()),
            remaining_seconds => Err(SessionError::TooEarly { remaining_seconds }),
        }
    }
}
