//! A client for the REST store backing the GraphQL API.
//!
//! The store speaks json-server conventions: `GET`/`POST`/`PATCH`/`DELETE` on
//! `/users` and `/companies` with JSON bodies, plus `GET /companies/{id}/users`
//! for the company-to-users relation. The client does not retry or time out;
//! any transport failure or non-2xx status is reported to the caller as-is.

use crate::schema::{Company, User};
use anyhow::Error;
use clap::Args;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use surf::Url;

/// REST store connection options.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// Base URL of the REST store backing the API.
    #[clap(
        long = "store-url",
        env = "USER_GRAPH_STORE_URL",
        default_value = "http://localhost:3000"
    )]
    pub store_url: Url,
}

impl Options {
    /// Create a client for the configured store.
    pub fn connect(&self) -> Store {
        Store::new(self.store_url.clone())
    }
}

/// A client for the REST store.
#[derive(Clone)]
pub struct Store {
    client: surf::Client,
}

impl Store {
    /// Create a client for the store at `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            client: surf::Config::default()
                .set_base_url(base_url)
                .try_into()
                .unwrap(),
        }
    }

    /// Fetch a single user.
    pub async fn user(&self, id: &str) -> Result<User, Error> {
        self.recv(self.client.get(format!("/users/{id}"))).await
    }

    /// Fetch a single company.
    pub async fn company(&self, id: &str) -> Result<Company, Error> {
        self.recv(self.client.get(format!("/companies/{id}"))).await
    }

    /// Fetch the users belonging to a company.
    pub async fn company_users(&self, id: &str) -> Result<Vec<User>, Error> {
        self.recv(self.client.get(format!("/companies/{id}/users")))
            .await
    }

    /// Create a user, returning the record as created by the store.
    pub async fn create_user(&self, user: &NewUser) -> Result<User, Error> {
        let req = self.client.post("/users").body_json(user).map_err(Error::msg)?;
        self.recv(req).await
    }

    /// Update the supplied fields of a user, returning the updated record.
    pub async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<User, Error> {
        let req = self
            .client
            .patch(format!("/users/{id}"))
            .body_json(patch)
            .map_err(Error::msg)?;
        self.recv(req).await
    }

    /// Delete a user.
    ///
    /// json-server answers a successful delete with an empty object, so a body
    /// without an `id` maps to [`None`]; stores that echo the deleted record
    /// get it passed through.
    pub async fn delete_user(&self, id: &str) -> Result<Option<User>, Error> {
        let body: Value = self.recv(self.client.delete(format!("/users/{id}"))).await?;
        if body.get("id").is_some() {
            Ok(Some(serde_json::from_value(body)?))
        } else {
            Ok(None)
        }
    }

    async fn recv<T: DeserializeOwned>(&self, req: surf::RequestBuilder) -> Result<T, Error> {
        let req = req.build();
        let method = req.method();
        let path = req.url().path().to_string();
        tracing::debug!(%method, %path, "store request");
        let mut res = self.client.send(req).await.map_err(Error::msg)?;
        if !res.status().is_success() {
            return Err(Error::msg(format!(
                "store responded {} to {method} {path}",
                res.status()
            )));
        }
        res.body_json().await.map_err(Error::msg)
    }
}

/// Fields for creating a user.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub first_name: String,
    pub age: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
}

/// A partial update to a user. Fields left [`None`] are omitted from the
/// request body, so the store leaves them untouched.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
}
