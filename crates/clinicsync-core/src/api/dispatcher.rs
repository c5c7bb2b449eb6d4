//! Resilient request dispatch against a backend whose auth-header scheme
//! and trailing-slash convention are not known in advance.
//!
//! Exploration order for one logical call (first non-auth, non-routing
//! response wins):
//!
//! 1. primary scheme, path as given
//! 2. primary scheme, alternate slash form (after an auth or routing failure)
//! 3. secondary scheme, the path form that last produced an auth failure
//!    (only if some primary attempt was an auth failure)
//! 4. secondary scheme, the other path form (only if step 3 was a routing failure)
//!
//! At most four physical attempts. Application errors and transport
//! failures are never retried.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::error::{DispatchError, StatusClass};
use super::request::{alternate_slash, RequestDescriptor};
use super::transport::{OutboundRequest, Transport};
use crate::auth::{Credential, Scheme};

/// A transport-successful 2xx response.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub status: u16,
    pub body: Value,
    /// Scheme the request finally went out under (`None` if unauthenticated).
    pub scheme: Option<Scheme>,
    /// Path form that succeeded.
    pub path: String,
    /// Physical attempts used, 1..=4.
    pub attempts: u8,
}

/// What one physical attempt told us.
enum Probe {
    Done(Result<Delivered, DispatchError>),
    Authorization,
    Routing,
}

/// Bookkeeping across the attempts of one logical call.
#[derive(Default)]
struct Exploration {
    attempts: u8,
    saw_authorization: bool,
    last_authorization_path: Option<String>,
}

/// Stateless apart from the transport and origin; clone freely and call
/// concurrently from independent tasks.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    origin: Arc<str>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, origin: &str) -> Self {
        Self {
            transport,
            origin: Arc::from(origin.trim_end_matches('/')),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.origin, path)
        } else {
            format!("{}/{}", self.origin, path)
        }
    }

    /// Execute one logical request, negotiating scheme and path shape.
    pub async fn dispatch(
        &self,
        credential: Option<&Credential>,
        request: &RequestDescriptor,
    ) -> Result<Delivered, DispatchError> {
        let policy = request.policy();
        let given = request.path().to_string();
        let alternate = alternate_slash(&given);
        let can_toggle = policy.try_alternate_slash && alternate != given;
        let primary = credential.map(|c| c.primary());
        let mut state = Exploration::default();

        // Primary scheme: the path as given, then its other slash form.
        match self.probe(credential, primary, &given, request, &mut state).await? {
            Probe::Done(result) => return result,
            Probe::Authorization | Probe::Routing if can_toggle => {
                if let Probe::Done(result) =
                    self.probe(credential, primary, &alternate, request, &mut state).await?
                {
                    return result;
                }
            }
            Probe::Authorization | Probe::Routing => {}
        }

        // Secondary scheme, only when the backend actually refused the
        // credential somewhere.
        let secondary = credential
            .and_then(|c| c.secondary())
            .filter(|_| policy.try_secondary_scheme);
        if let (Some(secondary), Some(auth_path)) = (secondary, state.last_authorization_path.clone()) {
            match self.probe(credential, Some(secondary), &auth_path, request, &mut state).await? {
                Probe::Done(result) => return result,
                Probe::Routing if policy.try_alternate_slash => {
                    let other = alternate_slash(&auth_path);
                    if other != auth_path {
                        if let Probe::Done(result) =
                            self.probe(credential, Some(secondary), &other, request, &mut state).await?
                        {
                            return result;
                        }
                    }
                }
                Probe::Authorization | Probe::Routing => {}
            }
        }

        if state.saw_authorization {
            warn!(path = %given, attempts = state.attempts, "Authorization exhausted");
            Err(DispatchError::AuthorizationExhausted { path: given })
        } else {
            warn!(path = %given, attempts = state.attempts, "Routing exhausted");
            Err(DispatchError::RoutingExhausted { path: given })
        }
    }

    /// One physical attempt. Transport failures abort the whole call.
    async fn probe(
        &self,
        credential: Option<&Credential>,
        scheme: Option<Scheme>,
        path: &str,
        request: &RequestDescriptor,
        state: &mut Exploration,
    ) -> Result<Probe, DispatchError> {
        state.attempts += 1;
        let authorization = match (credential, scheme) {
            (Some(c), Some(s)) => Some(c.authorization(s)),
            _ => None,
        };
        let outbound = OutboundRequest {
            method: request.method(),
            url: self.url_for(path),
            authorization,
            body: request.body().cloned(),
        };

        let response = self.transport.send(outbound).await?;
        let class = StatusClass::from_status(response.status);
        debug!(
            method = request.method().as_str(),
            path,
            scheme = ?scheme,
            attempt = state.attempts,
            status = response.status,
            "Dispatch attempt"
        );

        Ok(match class {
            StatusClass::Success => Probe::Done(Ok(Delivered {
                status: response.status,
                body: response.body,
                scheme,
                path: path.to_string(),
                attempts: state.attempts,
            })),
            StatusClass::Application => Probe::Done(Err(DispatchError::Application {
                status: response.status,
                payload: response.body,
            })),
            StatusClass::Authorization => {
                state.saw_authorization = true;
                state.last_authorization_path = Some(path.to_string());
                Probe::Authorization
            }
            StatusClass::Routing => Probe::Routing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::TransportError;
    use crate::api::request::AttemptPolicy;
    use crate::api::transport::testing::{ok, status, ScriptedTransport};
    use serde_json::json;

    const ORIGIN: &str = "http://clinic.test/api";

    fn dispatcher(transport: &Arc<ScriptedTransport>) -> Dispatcher {
        Dispatcher::new(transport.clone(), ORIGIN)
    }

    /// (authorization header, url) pairs in send order
    fn attempts(transport: &ScriptedTransport) -> Vec<(Option<String>, String)> {
        transport
            .sent()
            .into_iter()
            .map(|r| (r.authorization, r.url))
            .collect()
    }

    #[tokio::test]
    async fn test_secondary_scheme_reuses_auth_path() {
        let transport = Arc::new(ScriptedTransport::new(|req| {
            match (req.authorization.as_deref(), req.url.as_str()) {
                (Some("Bearer t"), "http://clinic.test/api/visits") => status(404),
                (Some("Bearer t"), "http://clinic.test/api/visits/") => status(401),
                (Some("Token t"), "http://clinic.test/api/visits/") => ok(json!([{"id": 1}])),
                _ => status(500),
            }
        }));
        let cred = Credential::new("t");

        let delivered = dispatcher(&transport)
            .dispatch(Some(&cred), &RequestDescriptor::get("/visits"))
            .await
            .unwrap();

        assert_eq!(delivered.scheme, Some(Scheme::Token));
        assert_eq!(delivered.path, "/visits/");
        assert_eq!(delivered.attempts, 3);
        assert_eq!(
            attempts(&transport),
            vec![
                (Some("Bearer t".into()), "http://clinic.test/api/visits".into()),
                (Some("Bearer t".into()), "http://clinic.test/api/visits/".into()),
                (Some("Token t".into()), "http://clinic.test/api/visits/".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_slash_style_converges() {
        for path in ["/patients", "/patients/"] {
            let transport = Arc::new(ScriptedTransport::new(|req| {
                if req.url.ends_with("/patients/") {
                    ok(json!({"results": []}))
                } else {
                    status(404)
                }
            }));

            let delivered = dispatcher(&transport)
                .dispatch(Some(&Credential::new("t")), &RequestDescriptor::get(path))
                .await
                .unwrap();

            assert_eq!(delivered.status, 200);
            assert_eq!(delivered.path, "/patients/");
            assert_eq!(delivered.scheme, Some(Scheme::Bearer));
        }
    }

    #[tokio::test]
    async fn test_application_error_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(422)));

        let err = dispatcher(&transport)
            .dispatch(
                Some(&Credential::new("t")),
                &RequestDescriptor::post("/patients/", json!({"name": ""})),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Application { status: 422, .. }));
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn test_server_error_surfaces_immediately() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(503)));
        let err = dispatcher(&transport)
            .dispatch(Some(&Credential::new("t")), &RequestDescriptor::get("/sales/"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn test_authorization_exhausted_when_every_scheme_refused() {
        let transport = Arc::new(ScriptedTransport::new(|req| {
            if req.url.ends_with('/') {
                status(403)
            } else {
                status(401)
            }
        }));

        let err = dispatcher(&transport)
            .dispatch(Some(&Credential::new("t")), &RequestDescriptor::get("/visits/"))
            .await
            .unwrap_err();

        assert!(err.is_authorization());
        // Secondary starts on the path that last refused the credential,
        // and only explores the other form after a routing failure.
        assert_eq!(
            attempts(&transport),
            vec![
                (Some("Bearer t".into()), "http://clinic.test/api/visits/".into()),
                (Some("Bearer t".into()), "http://clinic.test/api/visits".into()),
                (Some("Token t".into()), "http://clinic.test/api/visits".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_secondary_routing_failure_tries_other_path() {
        let transport = Arc::new(ScriptedTransport::new(|req| {
            match (req.authorization.as_deref(), req.url.ends_with('/')) {
                (Some("Bearer t"), _) => status(401),
                (Some("Token t"), false) => status(404),
                (Some("Token t"), true) => status(401),
                _ => status(500),
            }
        }));

        let err = dispatcher(&transport)
            .dispatch(Some(&Credential::new("t")), &RequestDescriptor::get("/visits"))
            .await
            .unwrap_err();

        assert!(err.is_authorization());
        assert_eq!(transport.count(), 4);
    }

    #[tokio::test]
    async fn test_routing_exhausted_skips_secondary_scheme() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(404)));

        let err = dispatcher(&transport)
            .dispatch(Some(&Credential::new("t")), &RequestDescriptor::get("/nowhere"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::RoutingExhausted { .. }));
        assert_eq!(transport.count(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_aborts() {
        let transport = Arc::new(ScriptedTransport::new(|req| {
            Err(TransportError::new(&req.url, "connection refused"))
        }));

        let err = dispatcher(&transport)
            .dispatch(Some(&Credential::new("t")), &RequestDescriptor::get("/visits/"))
            .await
            .unwrap_err();

        assert!(err.is_transport());
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn test_unauthenticated_request_has_no_header() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(401)));

        let err = dispatcher(&transport)
            .dispatch(None, &RequestDescriptor::get("/visits/"))
            .await
            .unwrap_err();

        assert!(err.is_authorization());
        assert_eq!(transport.count(), 2);
        assert!(transport.sent().iter().all(|r| r.authorization.is_none()));
    }

    #[tokio::test]
    async fn test_single_scheme_credential_skips_secondary() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(401)));
        let cred = Credential::with_schemes("t", vec![Scheme::Token]);

        dispatcher(&transport)
            .dispatch(Some(&cred), &RequestDescriptor::get("/visits/"))
            .await
            .unwrap_err();

        assert_eq!(transport.count(), 2);
        assert!(transport
            .sent()
            .iter()
            .all(|r| r.authorization.as_deref() == Some("Token t")));
    }

    #[tokio::test]
    async fn test_policy_can_disable_exploration() {
        let transport = Arc::new(ScriptedTransport::new(|_| status(401)));
        let request = RequestDescriptor::get("/visits/").with_policy(AttemptPolicy {
            try_alternate_slash: false,
            try_secondary_scheme: false,
        });

        dispatcher(&transport)
            .dispatch(Some(&Credential::new("t")), &request)
            .await
            .unwrap_err();

        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn test_query_string_survives_slash_toggle() {
        let transport = Arc::new(ScriptedTransport::new(|req| {
            if req.url == "http://clinic.test/api/pharmacy/sales/range?start=2024-01-01" {
                ok(json!({"sales": [{"id": 1}]}))
            } else {
                status(404)
            }
        }));

        let delivered = dispatcher(&transport)
            .dispatch(
                Some(&Credential::new("t")),
                &RequestDescriptor::get("/pharmacy/sales/range/?start=2024-01-01"),
            )
            .await
            .unwrap();

        assert_eq!(delivered.path, "/pharmacy/sales/range?start=2024-01-01");
    }
}
