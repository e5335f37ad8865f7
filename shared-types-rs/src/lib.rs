pub mod department;
pub mod envelope;
pub mod work_order;

pub use department::{Department, UnknownDepartment};
pub use envelope::{ChatEnvelope, EnvelopeError};
pub use work_order::{NewWorkOrder, Timestamps, WorkOrder, WorkOrderStatus};
