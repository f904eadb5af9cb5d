// Route module decomposition — each surface in its own file.
// Shared request guards live here; route functions in submodules.

mod agent;
mod campaigns;
mod hosts;
mod stream;
mod system;

// --- Re-exports (all route functions used by lib.rs mount) ---

pub use agent::{config, distributed_read, distributed_write, enroll, logger};
pub use campaigns::{create_campaign, get_campaign, list_campaigns};
pub use hosts::{get_host, list_hosts, queue_host_query};
pub use stream::{api_campaign_results_stream, campaign_results_stream, host_results_stream};
pub use system::{bad_request, not_found, unauthorized, unprocessable, up};

use crate::store::{RequestScope, Stores};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

/// Authenticated operator plus active organization, resolved from the
/// `Authorization: Bearer` API token. `X-Organization-Id` selects among
/// multiple memberships; otherwise the oldest membership wins.
pub struct OperatorScope(pub RequestScope);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for OperatorScope {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = req
            .headers()
            .get_one("Authorization")
            .and_then(|auth| auth.strip_prefix("Bearer "));
        let Some(token) = token else {
            return Outcome::Forward(Status::Unauthorized);
        };
        let Some(stores) = req.rocket().state::<Stores>() else {
            return Outcome::Forward(Status::InternalServerError);
        };
        let hint = req.headers().get_one("X-Organization-Id");
        match stores.identity.scope_for_token(token, hint) {
            Ok(scope) => Outcome::Success(OperatorScope(scope)),
            Err(_) => Outcome::Forward(Status::Unauthorized),
        }
    }
}
