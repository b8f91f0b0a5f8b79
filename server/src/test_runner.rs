#![cfg(test)]

//! End-to-end tests driving the gateway over HTTP against a mock REST store.
//!
//! Each test starts the mock store and a real gateway on free ports, then
//! talks to the gateway with `surf` the way a GraphQL client would.

use super::Options;
use anyhow::Error;
use async_std::task::{sleep, spawn};
use futures::future::try_join_all;
use model::{store, testing::MockStore};
use portpicker::pick_unused_port;
use serde_json::{json, Value};
use std::time::Duration;
use surf::{http::StatusCode, Client};

async fn start_gateway(mock: &MockStore) -> Result<Client, Error> {
    model::init_logging();

    let store_url = mock.spawn().await;
    let port = pick_unused_port().unwrap();
    let opt = Options {
        port,
        store: store::Options { store_url },
    };
    spawn(async move {
        opt.serve().await.unwrap();
        tracing::warn!("gateway exited");
    });

    let client: Client = surf::Config::default()
        .set_base_url(format!("http://localhost:{port}").parse().unwrap())
        .try_into()
        .unwrap();
    wait_for_server(&client).await?;
    Ok(client)
}

async fn graphql(client: &Client, query: &str) -> Result<Value, Error> {
    let mut res = client
        .post("/graphql")
        .body_json(&json!({ "query": query }))
        .map_err(Error::msg)?
        .send()
        .await
        .map_err(Error::msg)?;
    if res.status() != StatusCode::Ok {
        return Err(Error::msg(format!(
            "query failed with status {}",
            res.status()
        )));
    }
    res.body_json().await.map_err(Error::msg)
}

#[async_std::test]
async fn test_query_over_http() -> Result<(), Error> {
    let mock = MockStore::new();
    let client = start_gateway(&mock).await?;

    let body = graphql(
        &client,
        r#"{ user(id: "1") { firstName company { name } } }"#,
    )
    .await?;
    assert_eq!(
        body,
        json!({"data": {"user": {"firstName": "Ann", "company": {"name": "Acme"}}}})
    );
    assert_eq!(mock.calls(), ["GET /users/1", "GET /companies/c1"]);
    Ok(())
}

#[async_std::test]
async fn test_query_via_get() -> Result<(), Error> {
    let mock = MockStore::new();
    let client = start_gateway(&mock).await?;

    let mut res = client
        .get("/graphql")
        .query(&json!({"query": r#"{ company(id: "c1") { name } }"#}))
        .map_err(Error::msg)?
        .send()
        .await
        .map_err(Error::msg)?;
    assert_eq!(res.status(), StatusCode::Ok);
    let body: Value = res.body_json().await.map_err(Error::msg)?;
    assert_eq!(body, json!({"data": {"company": {"name": "Acme"}}}));
    Ok(())
}

#[async_std::test]
async fn test_console() -> Result<(), Error> {
    let mock = MockStore::new();
    let client = start_gateway(&mock).await?;

    let mut res = client
        .get("/graphql")
        .header("accept", "text/html")
        .send()
        .await
        .map_err(Error::msg)?;
    assert_eq!(res.status(), StatusCode::Ok);
    let body = res.body_string().await.map_err(Error::msg)?;
    assert!(body.contains("GraphiQL"), "not a console page: {body}");
    // Rendering the console touches no data.
    assert_eq!(mock.calls(), Vec::<String>::new());
    Ok(())
}

#[async_std::test]
async fn test_console_with_multiple_accept_values() -> Result<(), Error> {
    let mock = MockStore::new();
    let client = start_gateway(&mock).await?;

    // text/html in an earlier Accept value still selects the console.
    let mut req = client.get("/graphql").build();
    req.append_header("accept", "text/html");
    req.append_header("accept", "application/json");
    let mut res = client.send(req).await.map_err(Error::msg)?;
    assert_eq!(res.status(), StatusCode::Ok);
    let body = res.body_string().await.map_err(Error::msg)?;
    assert!(body.contains("GraphiQL"), "not a console page: {body}");
    Ok(())
}

#[async_std::test]
async fn test_liveness_route() -> Result<(), Error> {
    let mock = MockStore::new();
    let client = start_gateway(&mock).await?;

    let mut res = client.get("/").send().await.map_err(Error::msg)?;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(
        res.body_string().await.map_err(Error::msg)?,
        "user graph gateway is up"
    );
    Ok(())
}

#[async_std::test]
async fn test_mutations_over_http() -> Result<(), Error> {
    let mock = MockStore::new();
    let client = start_gateway(&mock).await?;

    let body = graphql(
        &client,
        r#"mutation { addUser(firstName: "Dee", age: 22) { id firstName } }"#,
    )
    .await?;
    assert_eq!(
        body,
        json!({"data": {"addUser": {"id": "99", "firstName": "Dee"}}})
    );

    // The delete reaches the store even though the client only observes null.
    let body = graphql(&client, r#"mutation { deleteUser(id: "1") { id } }"#).await?;
    assert_eq!(body["data"], json!({"deleteUser": null}));

    assert_eq!(mock.calls(), ["POST /users", "DELETE /users/1"]);
    Ok(())
}

#[async_std::test]
async fn test_validation_failure_makes_no_store_calls() -> Result<(), Error> {
    let mock = MockStore::new();
    let client = start_gateway(&mock).await?;

    let body = graphql(&client, r#"mutation { addUser(firstName: "Dee") { id } }"#).await?;
    assert!(!body["errors"].as_array().unwrap().is_empty());
    assert_eq!(mock.calls(), Vec::<String>::new());
    Ok(())
}

#[async_std::test]
async fn test_concurrent_requests() -> Result<(), Error> {
    let mock = MockStore::new();
    let client = start_gateway(&mock).await?;

    let bodies = try_join_all(["1", "2", "3"].map(|id| {
        let client = client.clone();
        async move {
            graphql(&client, &format!(r#"{{ user(id: "{id}") {{ firstName }} }}"#)).await
        }
    }))
    .await?;

    let names = bodies
        .iter()
        .map(|body| body["data"]["user"]["firstName"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, ["Ann", "Bo", "Cal"]);
    Ok(())
}

async fn wait_for_server(client: &Client) -> Result<(), Error> {
    const MAX_CONNECT_RETRIES: usize = 60;

    for _ in 0..MAX_CONNECT_RETRIES {
        match client.get("/").send().await {
            Ok(_) => return Ok(()),
            Err(err) => {
                tracing::warn!("waiting for gateway to start: {err}");
                sleep(Duration::from_millis(250)).await;
            }
        }
    }

    Err(Error::msg("timed out waiting for gateway"))
}
