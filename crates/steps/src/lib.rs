// Steprun Steps - concrete test steps and the default transport set

pub mod bios_settings_set;
pub mod input;
pub mod job_status;
pub mod registry;

pub use bios_settings_set::BiosSettingsSet;
pub use input::StepInput;
pub use job_status::JobStatusStep;
pub use registry::default_registry;
