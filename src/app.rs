use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::instrument;

use crate::pack::{Pack, Question};
use crate::storage::PackStorage;
use crate::sync::{PackChanged, PackSynchronizer};

const NEW_PACK_BASE_NAME: &str = "New pack";

/// Owns the pack list and the active-pack selection, and turns coalesced
/// pack-changed signals into whole-store saves.
pub struct QuizApp<S: PackStorage> {
    storage: S,
    packs: Vec<PackSynchronizer>,
    active: Option<usize>,
    changed_tx: UnboundedSender<PackChanged>,
    changed_rx: UnboundedReceiver<PackChanged>,
}

impl<S: PackStorage> QuizApp<S> {
    #[instrument(level = "info", skip(storage))]
    pub async fn load(storage: S) -> Self {
        let (changed_tx, changed_rx) = unbounded_channel();
        let packs: Vec<PackSynchronizer> = storage
            .load_all()
            .await
            .into_iter()
            .map(|pack| PackSynchronizer::new(pack, changed_tx.clone()))
            .collect();
        let active = if packs.is_empty() { None } else { Some(0) };
        Self {
            storage,
            packs,
            active,
            changed_tx,
            changed_rx,
        }
    }

    pub fn packs(&self) -> &[PackSynchronizer] {
        &self.packs
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_pack(&self) -> Option<&PackSynchronizer> {
        self.active.map(|index| &self.packs[index])
    }

    pub fn active_pack_mut(&mut self) -> Option<&mut PackSynchronizer> {
        self.active.map(|index| &mut self.packs[index])
    }

    pub fn select_pack(&mut self, index: usize) -> bool {
        if index >= self.packs.len() {
            return false;
        }
        self.active = Some(index);
        true
    }

    /// Creates a pack with a unique name and makes it active.
    pub fn create_pack(&mut self) -> &PackSynchronizer {
        let name = self.unique_pack_name(NEW_PACK_BASE_NAME);
        log::info!("Creating pack '{}'", name);
        self.packs
            .push(PackSynchronizer::new(Pack::new(name), self.changed_tx.clone()));
        self.active = Some(self.packs.len() - 1);
        let _ = self.changed_tx.send(PackChanged);
        &self.packs[self.packs.len() - 1]
    }

    /// Deletes the active pack. The new active pack is the one now at the
    /// same index, else the last one, else none.
    pub fn delete_active_pack(&mut self) -> bool {
        let Some(index) = self.active else {
            return false;
        };
        log::info!("Deleting pack '{}'", self.packs[index].name());
        self.packs.remove(index);
        self.active = if self.packs.is_empty() {
            None
        } else {
            Some(index.min(self.packs.len() - 1))
        };
        let _ = self.changed_tx.send(PackChanged);
        true
    }

    /// Appends an imported batch to the active pack as ordinary structural
    /// edits. Returns how many questions were added.
    pub fn import_into_active(&mut self, questions: Vec<Question>) -> usize {
        let Some(pack) = self.active_pack_mut() else {
            return 0;
        };
        let count = questions.len();
        for question in questions {
            pack.insert(question);
        }
        count
    }

    /// Polls field edits on every pack, drains pending pack-changed signals
    /// and, if any arrived, persists the whole store once.
    pub async fn process_changes(&mut self) -> bool {
        for pack in &mut self.packs {
            pack.poll_field_edits();
        }
        let mut dirty = false;
        while self.changed_rx.try_recv().is_ok() {
            dirty = true;
        }
        if dirty {
            self.persist().await;
        }
        dirty
    }

    /// Coarse whole-store save; failures are handled inside the storage.
    pub async fn persist(&self) {
        let models: Vec<Pack> = self.packs.iter().map(|p| p.pack().clone()).collect();
        self.storage.save_all(&models).await;
    }

    fn unique_pack_name(&self, base: &str) -> String {
        let taken = |candidate: &str| {
            self.packs
                .iter()
                .any(|p| p.name().eq_ignore_ascii_case(candidate))
        };
        if !taken(base) {
            return base.to_owned();
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{base} {suffix}");
            if !taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::AnswerOption;
    use crate::storage::seed_packs;
    use std::cell::RefCell;

    /// In-memory store recording every save.
    struct MemoryStorage {
        initial: Vec<Pack>,
        saves: RefCell<Vec<Vec<String>>>,
    }

    impl MemoryStorage {
        fn new(initial: Vec<Pack>) -> Self {
            Self {
                initial,
                saves: RefCell::new(Vec::new()),
            }
        }
    }

    impl PackStorage for MemoryStorage {
        async fn load_all(&self) -> Vec<Pack> {
            self.initial
                .iter()
                .map(|p| {
                    serde_json::from_str(&serde_json::to_string(p).unwrap()).unwrap()
                })
                .collect()
        }

        async fn save_all(&self, packs: &[Pack]) {
            self.saves
                .borrow_mut()
                .push(packs.iter().map(|p| p.name().to_owned()).collect());
        }
    }

    async fn app_with_seed() -> QuizApp<MemoryStorage> {
        QuizApp::load(MemoryStorage::new(seed_packs())).await
    }

    #[tokio::test]
    async fn loads_packs_and_activates_the_first() {
        let app = app_with_seed().await;
        assert_eq!(app.packs().len(), 1);
        assert_eq!(app.active_index(), Some(0));
        assert_eq!(app.active_pack().unwrap().name(), "Default Question Pack");
    }

    #[tokio::test]
    async fn created_packs_get_unique_names() {
        let mut app = app_with_seed().await;
        assert_eq!(app.create_pack().name(), "New pack");
        assert_eq!(app.create_pack().name(), "New pack 1");
        assert_eq!(app.create_pack().name(), "New pack 2");
        assert_eq!(app.active_index(), Some(3));

        app.active_pack_mut().unwrap().set_name("NEW PACK 3");
        assert_eq!(app.create_pack().name(), "New pack 4");
    }

    #[tokio::test]
    async fn deleting_the_active_pack_falls_back_to_a_neighbor() {
        let mut app = app_with_seed().await;
        app.create_pack();
        app.create_pack();
        app.select_pack(1);

        assert!(app.delete_active_pack());
        assert_eq!(app.active_index(), Some(1)); // pack now at the same index

        assert!(app.delete_active_pack());
        assert_eq!(app.active_index(), Some(0)); // new last pack

        assert!(app.delete_active_pack());
        assert_eq!(app.active_index(), None);
        assert!(!app.delete_active_pack());
    }

    #[tokio::test]
    async fn edits_trigger_exactly_one_coalesced_save() {
        let mut app = app_with_seed().await;
        assert!(!app.process_changes().await); // nothing pending

        let pack = app.active_pack_mut().unwrap();
        pack.set_name("Renamed");
        pack.insert(Question::new(
            "extra",
            vec![AnswerOption::new("a", true), AnswerOption::new("b", false)],
        ));

        assert!(app.process_changes().await);
        assert_eq!(app.storage.saves.borrow().len(), 1);
        assert_eq!(app.storage.saves.borrow()[0], vec!["Renamed".to_owned()]);

        assert!(!app.process_changes().await);
        assert_eq!(app.storage.saves.borrow().len(), 1);
    }

    #[tokio::test]
    async fn field_edits_inside_questions_also_persist() {
        let mut app = app_with_seed().await;
        let question = app.active_pack().unwrap().questions()[0].clone();
        question.borrow_mut().set_text("What is 2 + 2?");

        assert!(app.process_changes().await);
        assert_eq!(app.storage.saves.borrow().len(), 1);
    }

    #[tokio::test]
    async fn import_appends_to_the_active_pack() {
        let mut app = app_with_seed().await;
        let before = app.active_pack().unwrap().questions().len();

        let imported = vec![
            Question::new("i1", vec![AnswerOption::new("a", true)]),
            Question::new("i2", vec![AnswerOption::new("b", true)]),
        ];
        assert_eq!(app.import_into_active(imported), 2);
        assert_eq!(app.active_pack().unwrap().questions().len(), before + 2);

        assert!(app.process_changes().await);
    }

    #[tokio::test]
    async fn import_without_an_active_pack_is_a_no_op() {
        let mut app = app_with_seed().await;
        app.delete_active_pack();
        let imported = vec![Question::new("i1", vec![AnswerOption::new("a", true)])];
        assert_eq!(app.import_into_active(imported), 0);
    }
}
