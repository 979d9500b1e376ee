use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::answers::AnswerStore;
use crate::spec::{Questionnaire, StepId};
use crate::visibility::visible_steps;

/// One slot of the navigable sequence presented to the patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VirtualStep {
    Step { id: StepId },
    Checkout,
}

impl VirtualStep {
    pub fn step_id(&self) -> Option<&str> {
        match self {
            VirtualStep::Step { id } => Some(id),
            VirtualStep::Checkout => None,
        }
    }
}

/// Visible questionnaire steps plus the synthetic checkout slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualSequence {
    slots: Vec<VirtualStep>,
}

impl VirtualSequence {
    pub fn build(questionnaire: &Questionnaire, answers: &AnswerStore) -> Self {
        let mut slots = visible_steps(questionnaire, answers)
            .into_iter()
            .map(|step| VirtualStep::Step {
                id: step.id.clone(),
            })
            .collect::<Vec<_>>();
        let checkout = questionnaire.checkout_slot(slots.len());
        slots.insert(checkout, VirtualStep::Checkout);
        Self { slots }
    }

    /// Total number of virtual steps; always at least one (checkout).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.slots.len().saturating_sub(1)
    }

    pub fn get(&self, cursor: usize) -> Option<&VirtualStep> {
        self.slots.get(cursor)
    }

    pub fn slots(&self) -> &[VirtualStep] {
        &self.slots
    }

    pub fn position_of_step(&self, step_id: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.step_id() == Some(step_id))
    }

    pub fn checkout_index(&self) -> usize {
        self.slots
            .iter()
            .position(|slot| matches!(slot, VirtualStep::Checkout))
            .unwrap_or(self.last_index())
    }

    /// Cursor for `anchor` in this sequence. A hidden step resolves to the
    /// next visible step after it in declaration order, or to checkout when
    /// none remain.
    pub fn locate(&self, questionnaire: &Questionnaire, anchor: &VirtualStep) -> usize {
        let VirtualStep::Step { id } = anchor else {
            return self.checkout_index();
        };
        if let Some(position) = self.position_of_step(id) {
            return position;
        }
        let Some(start) = questionnaire.step_index(id) else {
            return self.checkout_index();
        };
        questionnaire.steps[start + 1..]
            .iter()
            .find_map(|step| self.position_of_step(&step.id))
            .unwrap_or_else(|| self.checkout_index())
    }
}
