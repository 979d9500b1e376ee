#![allow(missing_docs)]

pub mod checkout;
pub mod config;
pub mod error;
pub mod event;
pub mod gateway;
pub mod payload;
pub mod reduce;
pub mod session;
pub mod state;
pub mod view;

pub use checkout::{CheckoutState, PaymentStatus, ShippingField, ShippingInfo};
pub use config::{ConfigError, EngineConfig};
pub use error::{GatewayError, LoadError, SourceError};
pub use event::{Effect, Event, Rejection, Submission};
pub use gateway::{
    Customer, FileQuestionnaireSource, OfflineGateway, PaymentConfirmation, PaymentGateway,
    PaymentOutcome, PlanOption, Product, ProductSource, QuestionnaireRef, QuestionnaireSource,
    StaticCatalog, SubscriptionHandle, SubscriptionPayload,
};
pub use reduce::{apply, reduce};
pub use session::{Collaborators, IntakeSession};
pub use state::{PendingAdvance, SessionState};
pub use view::{CheckoutSnapshot, CurrentStep, QuestionView, SessionView};
