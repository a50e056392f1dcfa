use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::pack::{Difficulty, FieldChange, Pack, Question, SharedQuestion};

/// Raised exactly once per logical edit to a pack: a structural edit on the
/// question view, a pack metadata edit, or a field edit on a hooked question
/// or answer option. The owner drains these to trigger a whole-store save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackChanged;

/// Keeps an editable ordered view of a pack's questions in lockstep with the
/// backing record. The synchronizer is the sole writer of `pack.questions`.
pub struct PackSynchronizer {
    pack: Pack,
    questions: Vec<SharedQuestion>,
    hooked: HashSet<Uuid>,
    selected: Option<Weak<RefCell<Question>>>,
    subscriber_id: Uuid,
    field_tx: UnboundedSender<FieldChange>,
    field_rx: UnboundedReceiver<FieldChange>,
    changed_tx: UnboundedSender<PackChanged>,
}

impl PackSynchronizer {
    pub fn new(pack: Pack, changed_tx: UnboundedSender<PackChanged>) -> Self {
        let (field_tx, field_rx) = unbounded_channel();
        let mut sync = Self {
            questions: pack.questions().to_vec(),
            pack,
            hooked: HashSet::new(),
            selected: None,
            subscriber_id: Uuid::new_v4(),
            field_tx,
            field_rx,
            changed_tx,
        };
        for question in sync.questions.clone() {
            sync.hook(&question);
        }
        sync
    }

    pub fn pack(&self) -> &Pack {
        &self.pack
    }

    /// The editor-facing ordered view. Mirrors `pack.questions` at all times.
    pub fn questions(&self) -> &[SharedQuestion] {
        &self.questions
    }

    pub fn name(&self) -> &str {
        self.pack.name()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.pack.set_name(name);
        self.notify_changed();
    }

    pub fn difficulty(&self) -> Difficulty {
        self.pack.difficulty()
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.pack.set_difficulty(difficulty);
        self.notify_changed();
    }

    pub fn time_limit_seconds(&self) -> u32 {
        self.pack.time_limit_seconds()
    }

    pub fn set_time_limit_seconds(&mut self, seconds: u32) {
        self.pack.set_time_limit_seconds(seconds);
        self.notify_changed();
    }

    /// Appends a question to the view and mirrors it into the backing record.
    pub fn insert(&mut self, question: Question) -> SharedQuestion {
        let shared: SharedQuestion = Rc::new(RefCell::new(question));
        self.questions.push(shared.clone());
        self.pack.questions_mut().push(shared.clone());
        self.hook(&shared);
        self.notify_changed();
        shared
    }

    /// Removes a question by identity. When the removed question was the
    /// selected one, selection falls back to the item now at the same index,
    /// then the new last item, then none.
    pub fn remove(&mut self, question: &SharedQuestion) -> bool {
        let Some(index) = self
            .questions
            .iter()
            .position(|q| Rc::ptr_eq(q, question))
        else {
            return false;
        };

        let was_selected = self
            .selected_question()
            .is_some_and(|s| Rc::ptr_eq(&s, question));

        self.questions.remove(index);
        self.pack
            .questions_mut()
            .retain(|q| !Rc::ptr_eq(q, question));
        self.unhook(question);

        if was_selected {
            self.selected = self
                .questions
                .get(index)
                .or_else(|| self.questions.last())
                .map(Rc::downgrade);
        }

        self.notify_changed();
        true
    }

    /// Overwrites the question at `index` in both the view and the record.
    pub fn replace(&mut self, index: usize, question: Question) -> Option<SharedQuestion> {
        if index >= self.questions.len() {
            return None;
        }
        let old = self.questions[index].clone();
        self.unhook(&old);

        let shared: SharedQuestion = Rc::new(RefCell::new(question));
        self.hook(&shared);
        self.questions[index] = shared.clone();
        self.pack.questions_mut()[index] = shared.clone();

        if self
            .selected_question()
            .is_some_and(|s| Rc::ptr_eq(&s, &old))
        {
            self.selected = Some(Rc::downgrade(&shared));
        }

        self.notify_changed();
        Some(shared)
    }

    pub fn clear(&mut self) {
        for question in self.questions.clone() {
            self.unhook(&question);
        }
        self.questions.clear();
        self.pack.questions_mut().clear();
        self.selected = None;
        self.notify_changed();
    }

    /// Marks a question as the current editing target. Questions outside the
    /// view are ignored so selection can never point at a removed item.
    pub fn select(&mut self, question: &SharedQuestion) {
        if self.questions.iter().any(|q| Rc::ptr_eq(q, question)) {
            self.selected = Some(Rc::downgrade(question));
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected_question(&self) -> Option<SharedQuestion> {
        self.selected.as_ref().and_then(Weak::upgrade)
    }

    /// Drains pending field-change notifications from hooked entities and
    /// re-raises each as one pack-changed signal. Also picks up options added
    /// to a hooked question since the last poll (subscription is idempotent).
    pub fn poll_field_edits(&mut self) -> usize {
        let mut edits = 0;
        while let Ok(change) = self.field_rx.try_recv() {
            if self.hooked.contains(&change.entity) {
                self.resubscribe_options(change.entity);
            }
            self.notify_changed();
            edits += 1;
        }
        edits
    }

    fn resubscribe_options(&mut self, question_id: Uuid) {
        let Some(question) = self
            .questions
            .iter()
            .find(|q| q.borrow().id() == question_id)
            .cloned()
        else {
            return;
        };
        let mut question = question.borrow_mut();
        for option in question.options_mut() {
            option.subscribe(self.subscriber_id, self.field_tx.clone());
        }
    }

    fn hook(&mut self, question: &SharedQuestion) {
        let id = question.borrow().id();
        if !self.hooked.insert(id) {
            return;
        }
        let mut question = question.borrow_mut();
        question.subscribe(self.subscriber_id, self.field_tx.clone());
        for option in question.options_mut() {
            option.subscribe(self.subscriber_id, self.field_tx.clone());
        }
    }

    fn unhook(&mut self, question: &SharedQuestion) {
        let id = question.borrow().id();
        if !self.hooked.remove(&id) {
            return;
        }
        let mut question = question.borrow_mut();
        question.unsubscribe(self.subscriber_id);
        for option in question.options_mut() {
            option.unsubscribe(self.subscriber_id);
        }
    }

    fn notify_changed(&self) {
        let _ = self.changed_tx.send(PackChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::AnswerOption;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn question(text: &str) -> Question {
        Question::new(
            text,
            vec![
                AnswerOption::new("right", true),
                AnswerOption::new("wrong", false),
            ],
        )
    }

    fn synchronizer() -> (PackSynchronizer, UnboundedReceiver<PackChanged>) {
        let (tx, rx) = unbounded_channel();
        (PackSynchronizer::new(Pack::new("Test pack"), tx), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<PackChanged>) -> usize {
        let mut n = 0;
        while rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }

    #[test]
    fn structural_edits_mirror_into_the_record() {
        let (mut sync, _rx) = synchronizer();

        let q1 = sync.insert(question("q1"));
        let _q2 = sync.insert(question("q2"));
        sync.remove(&q1);
        sync.replace(0, question("q3"));

        // Replay the same edits against a plain list.
        let expected = vec!["q3"];
        let view: Vec<String> = sync
            .questions()
            .iter()
            .map(|q| q.borrow().text().to_owned())
            .collect();
        let record: Vec<String> = sync
            .pack()
            .questions()
            .iter()
            .map(|q| q.borrow().text().to_owned())
            .collect();
        assert_eq!(view, expected);
        assert_eq!(record, expected);

        for (v, r) in sync.questions().iter().zip(sync.pack().questions()) {
            assert!(Rc::ptr_eq(v, r));
        }
    }

    #[test]
    fn every_structural_edit_signals_exactly_once() {
        let (mut sync, mut rx) = synchronizer();

        let q1 = sync.insert(question("q1"));
        assert_eq!(drain(&mut rx), 1);

        sync.replace(0, question("q2"));
        assert_eq!(drain(&mut rx), 1);

        assert!(!sync.remove(&q1)); // already replaced away
        assert_eq!(drain(&mut rx), 0);

        let q2 = sync.questions()[0].clone();
        sync.remove(&q2);
        assert_eq!(drain(&mut rx), 1);

        sync.clear();
        assert_eq!(drain(&mut rx), 1);
    }

    #[test]
    fn pack_metadata_edits_signal() {
        let (mut sync, mut rx) = synchronizer();
        sync.set_name("Renamed");
        sync.set_difficulty(Difficulty::Hard);
        sync.set_time_limit_seconds(45);
        assert_eq!(drain(&mut rx), 3);
        assert_eq!(sync.pack().name(), "Renamed");
        assert_eq!(sync.pack().time_limit_seconds(), 45);
    }

    #[test]
    fn field_edits_on_hooked_entities_signal_once_each() {
        let (mut sync, mut rx) = synchronizer();
        let q = sync.insert(question("q1"));
        drain(&mut rx);

        q.borrow_mut().set_text("renamed question");
        q.borrow_mut().options_mut()[1].set_text("still wrong");
        assert_eq!(sync.poll_field_edits(), 2);
        assert_eq!(drain(&mut rx), 2);
    }

    #[test]
    fn removed_questions_stop_signalling() {
        let (mut sync, mut rx) = synchronizer();
        let q = sync.insert(question("q1"));
        sync.remove(&q);
        drain(&mut rx);

        q.borrow_mut().set_text("edited after removal");
        assert_eq!(sync.poll_field_edits(), 0);
        assert_eq!(drain(&mut rx), 0);
    }

    #[test]
    fn repeated_insert_remove_does_not_accumulate_subscriptions() {
        let (mut sync, mut rx) = synchronizer();
        let q = sync.insert(question("q1"));
        sync.remove(&q);
        let q = sync.insert(Rc::try_unwrap(q).unwrap().into_inner());
        drain(&mut rx);

        q.borrow_mut().set_text("one edit");
        assert_eq!(sync.poll_field_edits(), 1);
        assert_eq!(drain(&mut rx), 1);
    }

    #[test]
    fn options_added_after_hooking_are_picked_up() {
        let (mut sync, mut rx) = synchronizer();
        let q = sync.insert(question("q1"));
        drain(&mut rx);

        q.borrow_mut().add_option(AnswerOption::new("late", false));
        assert_eq!(sync.poll_field_edits(), 1);
        drain(&mut rx);

        let index = q.borrow().options().len() - 1;
        q.borrow_mut().options_mut()[index].set_correct(true);
        assert_eq!(sync.poll_field_edits(), 1);
        assert_eq!(drain(&mut rx), 1);
    }

    #[test]
    fn removing_selected_question_falls_back_to_neighbor() {
        let (mut sync, _rx) = synchronizer();
        let q1 = sync.insert(question("q1"));
        let q2 = sync.insert(question("q2"));
        let q3 = sync.insert(question("q3"));

        sync.select(&q2);
        sync.remove(&q2);
        let selected = sync.selected_question().unwrap();
        assert!(Rc::ptr_eq(&selected, &q3)); // item now at the same index

        sync.remove(&q3);
        let selected = sync.selected_question().unwrap();
        assert!(Rc::ptr_eq(&selected, &q1)); // new last item

        sync.remove(&q1);
        assert!(sync.selected_question().is_none());
    }

    #[test]
    fn selecting_a_foreign_question_is_ignored() {
        let (mut sync, _rx) = synchronizer();
        sync.insert(question("q1"));
        let outsider: SharedQuestion = Rc::new(RefCell::new(question("outsider")));
        sync.select(&outsider);
        assert!(sync.selected_question().is_none());
    }

    #[test]
    fn clear_empties_view_record_and_selection() {
        let (mut sync, mut rx) = synchronizer();
        let q1 = sync.insert(question("q1"));
        sync.insert(question("q2"));
        sync.select(&q1);
        drain(&mut rx);

        sync.clear();
        assert!(sync.questions().is_empty());
        assert!(sync.pack().questions().is_empty());
        assert!(sync.selected_question().is_none());
        assert_eq!(drain(&mut rx), 1);
    }
}
