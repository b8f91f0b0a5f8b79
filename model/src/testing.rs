//! A mock REST store for tests.
//!
//! Serves the json-server surface the facade expects from fixed in-memory
//! fixtures, and records every request so tests can assert exactly which
//! calls were made.
//!
//! The fixtures are four users ("Ann" and "Bo" at company "c1", "Cal" with no
//! company, "Dana" with a dangling reference to the deleted company "ghost")
//! and the company "c1" itself.

use portpicker::pick_unused_port;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use surf::Url;
use tide::{Request, Response, StatusCode};

/// A mock REST store.
#[derive(Clone, Debug, Default)]
pub struct MockStore {
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The requests seen so far, as `METHOD /path` strings in arrival order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Start the mock store on a free port, returning its base URL once it is
    /// accepting connections.
    pub async fn spawn(&self) -> Url {
        let port = pick_unused_port().expect("no free ports");
        let app = self.app();
        async_std::task::spawn(async move {
            app.listen(format!("127.0.0.1:{port}"))
                .await
                .expect("mock store exited");
        });

        let addr = format!("127.0.0.1:{port}");
        for _ in 0..50 {
            if async_std::net::TcpStream::connect(&addr).await.is_ok() {
                return format!("http://{addr}").parse().unwrap();
            }
            async_std::task::sleep(Duration::from_millis(100)).await;
        }
        panic!("timed out waiting for mock store");
    }

    fn app(&self) -> tide::Server<MockStore> {
        let mut app = tide::with_state(self.clone());

        app.at("/users/:id").get(|req: Request<MockStore>| async move {
            req.state().record(&req);
            match find(users(), req.param("id")?) {
                Some(user) => json_response(&user),
                None => Ok(not_found()),
            }
        });

        app.at("/users").post(|mut req: Request<MockStore>| async move {
            let state = req.state().clone();
            state.record(&req);
            let mut body: Value = req.body_json().await?;
            body["id"] = "99".into();
            json_response(&body)
        });

        app.at("/users/:id").patch(|mut req: Request<MockStore>| async move {
            let state = req.state().clone();
            state.record(&req);
            let id = req.param("id")?.to_string();
            let patch: Value = req.body_json().await?;
            let Some(mut user) = find(users(), &id) else {
                return Ok(not_found());
            };
            if let (Some(user), Some(patch)) = (user.as_object_mut(), patch.as_object()) {
                for (key, value) in patch {
                    user.insert(key.clone(), value.clone());
                }
            }
            json_response(&user)
        });

        app.at("/users/:id").delete(|req: Request<MockStore>| async move {
            req.state().record(&req);
            // json-server acknowledges a delete with an empty object.
            json_response(&json!({}))
        });

        app.at("/companies/:id").get(|req: Request<MockStore>| async move {
            req.state().record(&req);
            match find(companies(), req.param("id")?) {
                Some(company) => json_response(&company),
                None => Ok(not_found()),
            }
        });

        app.at("/companies/:id/users")
            .get(|req: Request<MockStore>| async move {
                req.state().record(&req);
                let id = req.param("id")?;
                let members = users()
                    .into_iter()
                    .filter(|user| user["companyId"] == *id)
                    .collect::<Vec<_>>();
                json_response(&members)
            });

        app
    }

    fn record(&self, req: &Request<MockStore>) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", req.method(), req.url().path()));
    }
}

fn users() -> Vec<Value> {
    vec![
        json!({"id": "1", "firstName": "Ann", "age": 25, "companyId": "c1"}),
        json!({"id": "2", "firstName": "Bo", "age": 31, "companyId": "c1"}),
        json!({"id": "3", "firstName": "Cal", "age": 40}),
        json!({"id": "4", "firstName": "Dana", "age": 37, "companyId": "ghost"}),
    ]
}

fn companies() -> Vec<Value> {
    vec![json!({"id": "c1", "name": "Acme", "description": "Widget monopoly"})]
}

fn find(records: Vec<Value>, id: &str) -> Option<Value> {
    records.into_iter().find(|record| record["id"] == *id)
}

fn json_response(body: &impl Serialize) -> tide::Result<Response> {
    let mut res = Response::new(StatusCode::Ok);
    res.set_body(tide::Body::from_json(body)?);
    Ok(res)
}

fn not_found() -> Response {
    Response::new(StatusCode::NotFound)
}
