use deb_types::{Filter, Transaction};

/// One transform applied by a derived space's read flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Keep matching transactions whole.
    Slice(Filter),
    /// Keep matching transactions, restricted to the filter's accounts.
    Projection(Filter),
}

impl Stage {
    pub fn apply(&self, tx: Transaction) -> Option<Transaction> {
        match self {
            Stage::Slice(filter) => filter.matches(&tx).then_some(tx),
            Stage::Projection(filter) => filter.project(tx),
        }
    }
}

/// Ordered stages a read flow runs every stored transaction through.
///
/// Deriving a space appends a stage; the base space's stages are never
/// altered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this pipeline with `stage` appended.
    pub fn with(&self, stage: Stage) -> Self {
        let mut stages = self.stages.clone();
        stages.push(stage);
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn apply(&self, tx: Transaction) -> Option<Transaction> {
        self.stages
            .iter()
            .try_fold(tx, |tx, stage| stage.apply(tx))
    }
}
