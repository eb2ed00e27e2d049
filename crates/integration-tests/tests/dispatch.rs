#[path = "dispatch/admission.rs"]
mod admission;
#[path = "dispatch/azure.rs"]
mod azure;
#[path = "dispatch/cancellation.rs"]
mod cancellation;
#[path = "dispatch/claude.rs"]
mod claude;
#[path = "dispatch/compatible.rs"]
mod compatible;
#[path = "dispatch/configuration.rs"]
mod configuration;
#[path = "dispatch/observation.rs"]
mod observation;
#[path = "dispatch/openai.rs"]
mod openai;
#[path = "dispatch/qianwen.rs"]
mod qianwen;
