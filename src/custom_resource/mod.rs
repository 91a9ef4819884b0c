//! CloudFormation custom resource lifecycle: the wire event and response,
//! the create/update/delete state machine, and the Lambda runtime glue.
mod events;
mod lambda;
mod permissions;
mod provider;
mod response;

pub use events::{ProviderRequest, RequestType};
pub use lambda::{run, send_response};
pub use permissions::{database_permissions_check, secrets_permissions_check, PermissionsError};
pub use provider::{handle_event, physical_id, CustomResource, ValidationError, DEADLINE_MARGIN};
pub use response::{ProviderResponse, ProviderResponseBuilder, ResponseStatus};
