use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub const DEFAULT_TIME_LIMIT_SECONDS: u32 = 20;

/// Question handle shared between a pack's backing record and the
/// synchronizer's editable view.
pub type SharedQuestion = Rc<RefCell<Question>>;

/// Emitted by [`Question`] and [`AnswerOption`] setters whenever a field
/// actually changes value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldChange {
    pub entity: Uuid,
}

/// Subscription list carried by every mutable entity. Subscribing twice with
/// the same subscriber id is a no-op, as is unsubscribing an unknown id.
#[derive(Debug, Default)]
pub struct Subscribers {
    senders: Vec<(Uuid, UnboundedSender<FieldChange>)>,
}

impl Subscribers {
    pub fn subscribe(&mut self, subscriber: Uuid, tx: UnboundedSender<FieldChange>) {
        if self.senders.iter().any(|(id, _)| *id == subscriber) {
            return;
        }
        self.senders.push((subscriber, tx));
    }

    pub fn unsubscribe(&mut self, subscriber: Uuid) {
        self.senders.retain(|(id, _)| *id != subscriber);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    fn notify(&self, entity: Uuid) {
        for (_, tx) in &self.senders {
            let _ = tx.send(FieldChange { entity });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Lowercase form used by the Open Trivia Database query string.
    pub fn as_query_param(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerOption {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    text: String,
    is_correct: bool,
    #[serde(skip)]
    subscribers: Subscribers,
}

impl AnswerOption {
    pub fn new(text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            is_correct,
            subscribers: Subscribers::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_correct(&self) -> bool {
        self.is_correct
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.text == text {
            return;
        }
        self.text = text;
        self.subscribers.notify(self.id);
    }

    pub fn set_correct(&mut self, is_correct: bool) {
        if self.is_correct == is_correct {
            return;
        }
        self.is_correct = is_correct;
        self.subscribers.notify(self.id);
    }

    pub fn subscribe(&mut self, subscriber: Uuid, tx: UnboundedSender<FieldChange>) {
        self.subscribers.subscribe(subscriber, tx);
    }

    pub fn unsubscribe(&mut self, subscriber: Uuid) {
        self.subscribers.unsubscribe(subscriber);
    }
}

impl fmt::Display for AnswerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.text,
            if self.is_correct { 'V' } else { 'X' }
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Question {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    text: String,
    options: Vec<AnswerOption>,
    #[serde(skip)]
    subscribers: Subscribers,
}

impl Question {
    pub fn new(text: impl Into<String>, options: Vec<AnswerOption>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            options,
            subscribers: Subscribers::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut [AnswerOption] {
        &mut self.options
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.text == text {
            return;
        }
        self.text = text;
        self.subscribers.notify(self.id);
    }

    /// Appending or removing an option counts as an edit to the question
    /// itself, so the question's own subscribers are notified.
    pub fn add_option(&mut self, option: AnswerOption) {
        self.options.push(option);
        self.subscribers.notify(self.id);
    }

    pub fn remove_option(&mut self, index: usize) -> Option<AnswerOption> {
        if index >= self.options.len() {
            return None;
        }
        let removed = self.options.remove(index);
        self.subscribers.notify(self.id);
        Some(removed)
    }

    pub fn subscribe(&mut self, subscriber: Uuid, tx: UnboundedSender<FieldChange>) {
        self.subscribers.subscribe(subscriber, tx);
    }

    pub fn unsubscribe(&mut self, subscriber: Uuid) {
        self.subscribers.unsubscribe(subscriber);
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.text)?;
        for (i, option) in self.options.iter().enumerate() {
            writeln!(f, "{}) {}", i + 1, option)?;
        }
        Ok(())
    }
}

fn default_time_limit() -> u32 {
    DEFAULT_TIME_LIMIT_SECONDS
}

/// Durable pack record. The question sequence is only ever rewritten by the
/// pack synchronizer; the quiz session works on a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    name: String,
    #[serde(default)]
    difficulty: Difficulty,
    #[serde(default = "default_time_limit")]
    time_limit_seconds: u32,
    #[serde(default)]
    questions: Vec<SharedQuestion>,
}

impl Pack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            difficulty: Difficulty::default(),
            time_limit_seconds: DEFAULT_TIME_LIMIT_SECONDS,
            questions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_seconds
    }

    pub fn questions(&self) -> &[SharedQuestion] {
        &self.questions
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
    }

    pub(crate) fn set_time_limit_seconds(&mut self, seconds: u32) {
        self.time_limit_seconds = seconds;
    }

    pub(crate) fn push_question(&mut self, question: Question) {
        self.questions.push(Rc::new(RefCell::new(question)));
    }

    pub(crate) fn questions_mut(&mut self) -> &mut Vec<SharedQuestion> {
        &mut self.questions
    }
}

impl fmt::Display for Pack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] ({} questions, {}s per question)",
            self.name,
            self.difficulty,
            self.questions.len(),
            self.time_limit_seconds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn setter_notifies_on_actual_change_only() {
        let (tx, mut rx) = unbounded_channel();
        let subscriber = Uuid::new_v4();
        let mut option = AnswerOption::new("Paris", true);
        option.subscribe(subscriber, tx);

        option.set_text("Paris");
        assert!(rx.try_recv().is_err());

        option.set_text("London");
        let change = rx.try_recv().unwrap();
        assert_eq!(change.entity, option.id());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn duplicate_subscription_delivers_once() {
        let (tx, mut rx) = unbounded_channel();
        let subscriber = Uuid::new_v4();
        let mut question = Question::new("Q", vec![]);
        question.subscribe(subscriber, tx.clone());
        question.subscribe(subscriber, tx);

        question.set_text("Q2");
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn option_edits_notify_the_question() {
        let (tx, mut rx) = unbounded_channel();
        let subscriber = Uuid::new_v4();
        let mut question = Question::new("Q", vec![AnswerOption::new("a", true)]);
        question.subscribe(subscriber, tx);

        question.add_option(AnswerOption::new("b", false));
        assert!(rx.try_recv().is_ok());

        question.remove_option(1);
        assert!(rx.try_recv().is_ok());

        assert!(question.remove_option(5).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn pack_round_trips_through_json() {
        let mut pack = Pack::new("Capitals");
        pack.push_question(Question::new(
            "Capital of France?",
            vec![
                AnswerOption::new("Paris", true),
                AnswerOption::new("Lyon", false),
            ],
        ));

        let json = serde_json::to_string(&pack).unwrap();
        let restored: Pack = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.name(), "Capitals");
        assert_eq!(restored.difficulty(), Difficulty::Medium);
        assert_eq!(restored.time_limit_seconds(), DEFAULT_TIME_LIMIT_SECONDS);
        assert_eq!(restored.questions().len(), 1);
        let question = restored.questions()[0].borrow();
        assert_eq!(question.options().len(), 2);
        assert!(question.options()[0].is_correct());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let pack: Pack = serde_json::from_str(r#"{"name":"Bare"}"#).unwrap();
        assert_eq!(pack.time_limit_seconds(), 20);
        assert_eq!(pack.difficulty(), Difficulty::Medium);
        assert!(pack.questions().is_empty());
    }
}
