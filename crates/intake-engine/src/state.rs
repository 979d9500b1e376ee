use std::sync::Arc;

use intake_spec::{
    AnswerStore, AnswerValue, ErrorMap, Questionnaire, StepSpec, VirtualSequence, VirtualStep,
};

use crate::checkout::CheckoutState;
use crate::gateway::{PlanOption, Product};

/// Auto-advance waiting for its debounce to elapse. It only fires if the
/// cursor still addresses `step` and `question` still holds `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAdvance {
    pub token: u64,
    pub step: String,
    pub question: String,
    pub value: AnswerValue,
}

/// Complete state of one patient session. Only [`crate::reduce`] mutates it.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub questionnaire: Arc<Questionnaire>,
    pub products: Vec<Product>,
    pub plans: Vec<PlanOption>,
    pub answers: AnswerStore,
    pub cursor: usize,
    /// Virtual step the cursor addresses; used to resync after answers
    /// change the set of visible steps.
    pub anchor: VirtualStep,
    pub errors: ErrorMap,
    pub checkout: CheckoutState,
    pub completed: bool,
    pub pending_advance: Option<PendingAdvance>,
    pub(crate) next_token: u64,
}

impl SessionState {
    pub fn new(
        questionnaire: Arc<Questionnaire>,
        products: Vec<Product>,
        plans: Vec<PlanOption>,
    ) -> Self {
        let answers = AnswerStore::new();
        let anchor = VirtualSequence::build(&questionnaire, &answers)
            .get(0)
            .cloned()
            .unwrap_or(VirtualStep::Checkout);
        Self {
            questionnaire,
            products,
            plans,
            answers,
            cursor: 0,
            anchor,
            errors: ErrorMap::new(),
            checkout: CheckoutState::default(),
            completed: false,
            pending_advance: None,
            next_token: 0,
        }
    }

    pub fn sequence(&self) -> VirtualSequence {
        VirtualSequence::build(&self.questionnaire, &self.answers)
    }

    /// Questionnaire step under the cursor, or `None` on the checkout slot.
    pub fn current_step(&self) -> Option<&StepSpec> {
        self.anchor
            .step_id()
            .and_then(|id| self.questionnaire.step(id))
    }

    pub fn on_checkout(&self) -> bool {
        matches!(self.anchor, VirtualStep::Checkout)
    }

    pub fn plan(&self, plan_id: &str) -> Option<&PlanOption> {
        self.plans.iter().find(|plan| plan.id == plan_id)
    }

    pub(crate) fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}
