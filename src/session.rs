use std::time::Duration;

use rand::seq::SliceRandom;

use crate::pack::Pack;
use crate::scheduler::Scheduler;

/// A countdown shorter than this is not playable; shorter pack settings are
/// clamped up.
pub const MIN_COUNTDOWN_SECONDS: u32 = 2;

const TICK_PERIOD: Duration = Duration::from_secs(1);
const ADVANCE_DELAY: Duration = Duration::from_millis(1500);

const NO_QUESTIONS_MESSAGE: &str = "No questions available in this pack.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    QuestionActive,
    AnswerRevealed,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevealState {
    #[default]
    Default,
    Correct,
    Incorrect,
}

/// One entry of the shuffled answer view shown for the current question.
#[derive(Debug, Clone)]
pub struct PlayAnswer {
    text: String,
    is_correct: bool,
    reveal: RevealState,
}

impl PlayAnswer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_correct(&self) -> bool {
        self.is_correct
    }

    pub fn reveal(&self) -> RevealState {
        self.reveal
    }
}

#[derive(Debug, Clone)]
struct QuestionSnapshot {
    text: String,
    options: Vec<(String, bool)>,
}

/// Timed single-attempt-per-question playback engine.
///
/// Works on a snapshot taken at [`QuizSession::start`], so gameplay can never
/// corrupt the editable pack. Timer callbacks are delivered externally as
/// [`QuizSession::tick`] and [`QuizSession::advance`]; both are no-ops outside
/// the phase they belong to, which also serves as the re-entrancy guard when
/// a countdown expiry races a user selection.
pub struct QuizSession<S: Scheduler> {
    scheduler: S,
    phase: SessionPhase,
    snapshot: Vec<QuestionSnapshot>,
    time_limit: u32,
    play_order: Vec<QuestionSnapshot>,
    current: Option<usize>,
    next_index: usize,
    answers: Vec<PlayAnswer>,
    answers_enabled: bool,
    score: u32,
    time_remaining: u32,
    status: String,
}

impl<S: Scheduler> QuizSession<S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            phase: SessionPhase::Idle,
            snapshot: Vec::new(),
            time_limit: MIN_COUNTDOWN_SECONDS,
            play_order: Vec::new(),
            current: None,
            next_index: 0,
            answers: Vec::new(),
            answers_enabled: false,
            score: 0,
            time_remaining: 0,
            status: String::new(),
        }
    }

    /// Begins a play-through of `pack`. Soft-fails with a status message and
    /// stays in `Idle` when the pack is absent or has no questions.
    pub fn start(&mut self, pack: Option<&Pack>) {
        self.stop();

        let Some(pack) = pack else {
            self.status = NO_QUESTIONS_MESSAGE.to_owned();
            return;
        };
        if pack.questions().is_empty() {
            self.status = NO_QUESTIONS_MESSAGE.to_owned();
            return;
        }

        self.snapshot = pack
            .questions()
            .iter()
            .map(|question| {
                let question = question.borrow();
                QuestionSnapshot {
                    text: question.text().to_owned(),
                    options: question
                        .options()
                        .iter()
                        .map(|option| (option.text().to_owned(), option.is_correct()))
                        .collect(),
                }
            })
            .collect();
        self.time_limit = pack.time_limit_seconds().max(MIN_COUNTDOWN_SECONDS);
        self.begin_run();
    }

    /// Starts the retained snapshot over with a fresh shuffle. Only valid
    /// once the previous run has finished.
    pub fn restart(&mut self) {
        if self.phase != SessionPhase::Finished {
            return;
        }
        self.begin_run();
    }

    /// Cancels all timers and returns to `Idle`, from any state.
    pub fn stop(&mut self) {
        self.scheduler.stop_repeating();
        self.scheduler.cancel_once();
        self.phase = SessionPhase::Idle;
        self.play_order.clear();
        self.current = None;
        self.next_index = 0;
        self.answers.clear();
        self.answers_enabled = false;
        self.score = 0;
        self.time_remaining = 0;
        self.status.clear();
    }

    /// Countdown callback. Only acts while a question is active.
    pub fn tick(&mut self) {
        if self.phase != SessionPhase::QuestionActive {
            return;
        }
        if self.time_remaining > 0 {
            self.time_remaining -= 1;
        }
        if self.time_remaining == 0 {
            self.scheduler.stop_repeating();
            self.handle_time_expired();
        }
    }

    /// Player picks the answer at `index` in the current answer view. The
    /// first of `select`/`tick` to resolve the question wins; the loser is a
    /// no-op.
    pub fn select(&mut self, index: usize) {
        if self.phase != SessionPhase::QuestionActive || index >= self.answers.len() {
            return;
        }
        self.scheduler.stop_repeating();
        self.answers_enabled = false;

        if self.answers[index].is_correct {
            self.score += 1;
            self.answers[index].reveal = RevealState::Correct;
            self.status = "Correct!".to_owned();
        } else {
            self.answers[index].reveal = RevealState::Incorrect;
            let correct_texts = self.reveal_correct_answers();
            self.status = if correct_texts.is_empty() {
                "Incorrect!".to_owned()
            } else {
                format!("Incorrect! Correct answer: {}", correct_texts.join(", "))
            };
        }

        self.schedule_advance();
    }

    /// Post-answer delay callback. Only acts after a question has resolved.
    pub fn advance(&mut self) {
        if self.phase != SessionPhase::AnswerRevealed {
            return;
        }
        self.load_next_question();
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == SessionPhase::Finished
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn answers(&self) -> &[PlayAnswer] {
        &self.answers
    }

    pub fn answers_enabled(&self) -> bool {
        self.answers_enabled
    }

    pub fn current_question_text(&self) -> &str {
        self.current
            .map(|index| self.play_order[index].text.as_str())
            .unwrap_or_default()
    }

    pub fn question_number(&self) -> usize {
        self.current.map(|index| index + 1).unwrap_or(0)
    }

    pub fn total_questions(&self) -> usize {
        self.play_order.len()
    }

    pub fn progress_text(&self) -> String {
        match self.current {
            Some(index) => format!("Question {} of {}", index + 1, self.play_order.len()),
            None => String::new(),
        }
    }

    fn begin_run(&mut self) {
        self.scheduler.cancel_once();
        self.status.clear();
        self.score = 0;
        self.play_order = self.snapshot.clone();
        self.play_order.shuffle(&mut rand::thread_rng());
        self.current = None;
        self.next_index = 0;
        self.load_next_question();
    }

    fn load_next_question(&mut self) {
        self.scheduler.cancel_once();

        if self.next_index >= self.play_order.len() {
            self.finish();
            return;
        }

        let index = self.next_index;
        self.next_index += 1;
        self.current = Some(index);

        let mut answers: Vec<PlayAnswer> = self.play_order[index]
            .options
            .iter()
            .map(|(text, is_correct)| PlayAnswer {
                text: text.clone(),
                is_correct: *is_correct,
                reveal: RevealState::Default,
            })
            .collect();
        answers.shuffle(&mut rand::thread_rng());

        self.answers = answers;
        self.answers_enabled = true;
        self.time_remaining = self.time_limit;
        self.status.clear();
        self.scheduler.start_repeating(TICK_PERIOD);
        self.phase = SessionPhase::QuestionActive;
    }

    fn handle_time_expired(&mut self) {
        self.answers_enabled = false;
        let correct_texts = self.reveal_correct_answers();
        self.status = if correct_texts.is_empty() {
            "Time's up!".to_owned()
        } else {
            format!("Time's up! Correct answer: {}", correct_texts.join(", "))
        };
        self.schedule_advance();
    }

    fn reveal_correct_answers(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        for answer in &mut self.answers {
            if answer.is_correct {
                answer.reveal = RevealState::Correct;
                texts.push(answer.text.clone());
            }
        }
        texts
    }

    fn schedule_advance(&mut self) {
        self.scheduler.start_once(ADVANCE_DELAY);
        self.phase = SessionPhase::AnswerRevealed;
    }

    fn finish(&mut self) {
        self.scheduler.stop_repeating();
        self.answers.clear();
        self.answers_enabled = false;
        self.current = None;
        self.time_remaining = 0;
        self.status = format!(
            "Quiz finished! You answered {} out of {} questions correctly.",
            self.score,
            self.play_order.len()
        );
        self.phase = SessionPhase::Finished;
    }
}
