//! The schema describing the entities and relationships in the GraphQL API.
//!
//! Every cross-entity field resolves through the [`Store`] injected into the
//! schema as context data; the facade keeps no state of its own between
//! requests.

use crate::store::{NewUser, Store, UserPatch};
use async_graphql::{
    ComplexObject, Context, EmptySubscription, Object, PathSegment, QueryPathSegment, Result,
    Schema, ServerError, SimpleObject,
};
use serde::{Deserialize, Serialize};

/// The GraphQL schema served by the gateway.
pub type GatewaySchema = Schema<Query, Mutation, EmptySubscription>;

/// Report a store failure as an `errors` entry on the response.
///
/// Resolvers call this and yield `None` instead of returning `Err`, so a
/// failed field carries `null` while the rest of the response survives.
/// Returning `Err` would make the engine discard the whole `data` payload.
fn report_store_error(ctx: &Context<'_>, err: anyhow::Error) {
    let mut error = ServerError::new(err.to_string(), Some(ctx.item.pos));
    let mut segments = Vec::new();
    let mut node = ctx.path_node.as_ref();
    while let Some(current) = node {
        segments.push(match current.segment {
            QueryPathSegment::Name(name) => PathSegment::Field(name.to_string()),
            QueryPathSegment::Index(index) => PathSegment::Index(index),
        });
        node = current.parent;
    }
    segments.reverse();
    error.path = segments;
    ctx.add_error(error);
}

/// A person registered in the REST store.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, SimpleObject)]
#[graphql(complex)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// The user's given name.
    pub first_name: String,
    pub age: i32,
    /// Foreign reference to the employing company.
    ///
    /// Backs the `company` field below; the reference itself is not part of
    /// the GraphQL schema.
    #[graphql(skip)]
    pub company_id: Option<String>,
}

#[ComplexObject]
impl User {
    /// The company employing this user, if any.
    async fn company(&self, ctx: &Context<'_>) -> Result<Option<Company>> {
        let Some(company_id) = &self.company_id else {
            return Ok(None);
        };
        let store = ctx.data_unchecked::<Store>();
        match store.company(company_id).await {
            Ok(company) => Ok(Some(company)),
            Err(err) => {
                report_store_error(ctx, err);
                Ok(None)
            }
        }
    }
}

/// A company registered in the REST store.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, SimpleObject)]
#[graphql(complex)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    /// The company's display name.
    pub name: String,
    /// A short description of what the company does.
    pub description: String,
}

#[ComplexObject]
impl Company {
    /// Users employed by this company.
    async fn users(&self, ctx: &Context<'_>) -> Result<Option<Vec<User>>> {
        let store = ctx.data_unchecked::<Store>();
        match store.company_users(&self.id).await {
            Ok(users) => Ok(Some(users)),
            Err(err) => {
                report_store_error(ctx, err);
                Ok(None)
            }
        }
    }
}

/// Entrypoint for read-only GraphQL queries.
#[derive(Clone, Copy, Debug)]
pub struct Query;

#[Object]
impl Query {
    /// Look up a single user by id.
    async fn user(&self, ctx: &Context<'_>, id: String) -> Result<Option<User>> {
        let store = ctx.data_unchecked::<Store>();
        match store.user(&id).await {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                report_store_error(ctx, err);
                Ok(None)
            }
        }
    }

    /// Look up a single company by id.
    async fn company(&self, ctx: &Context<'_>, id: String) -> Result<Option<Company>> {
        let store = ctx.data_unchecked::<Store>();
        match store.company(&id).await {
            Ok(company) => Ok(Some(company)),
            Err(err) => {
                report_store_error(ctx, err);
                Ok(None)
            }
        }
    }
}

/// Entrypoint for mutations. Each mutation is forwarded to the store
/// unmodified, and the store's response is passed back to the client.
#[derive(Clone, Copy, Debug)]
pub struct Mutation;

#[Object]
impl Mutation {
    /// Create a user, returning the record as created by the store.
    async fn add_user(
        &self,
        ctx: &Context<'_>,
        first_name: String,
        age: i32,
        company_id: Option<String>,
    ) -> Result<Option<User>> {
        let store = ctx.data_unchecked::<Store>();
        match store
            .create_user(&NewUser {
                first_name,
                age,
                company_id,
            })
            .await
        {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                report_store_error(ctx, err);
                Ok(None)
            }
        }
    }

    /// Delete a user.
    ///
    /// The store is free to answer a delete with an empty body (json-server
    /// does), in which case the client sees `null` even though the delete went
    /// through.
    async fn delete_user(&self, ctx: &Context<'_>, id: String) -> Result<Option<User>> {
        let store = ctx.data_unchecked::<Store>();
        match store.delete_user(&id).await {
            Ok(user) => Ok(user),
            Err(err) => {
                report_store_error(ctx, err);
                Ok(None)
            }
        }
    }

    /// Update the supplied fields of a user, returning the updated record.
    async fn modify_user(
        &self,
        ctx: &Context<'_>,
        id: String,
        first_name: Option<String>,
        age: Option<i32>,
        company_id: Option<String>,
    ) -> Result<Option<User>> {
        let store = ctx.data_unchecked::<Store>();
        match store
            .update_user(
                &id,
                &UserPatch {
                    first_name,
                    age,
                    company_id,
                },
            )
            .await
        {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                report_store_error(ctx, err);
                Ok(None)
            }
        }
    }
}

/// Create the schema for the GraphQL API, backed by `store`.
pub fn generate(store: Store) -> GatewaySchema {
    Schema::build(Query, Mutation, EmptySubscription)
        .data(store)
        .finish()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::MockStore;
    use serde_json::{json, Value};

    async fn generate_with_mock(mock: &MockStore) -> GatewaySchema {
        crate::init_logging();
        generate(Store::new(mock.spawn().await))
    }

    fn data(res: async_graphql::Response) -> Value {
        assert!(res.errors.is_empty(), "{:?}", res.errors);
        res.data.into_json().unwrap()
    }

    #[async_std::test]
    async fn test_user_with_company() {
        let mock = MockStore::new();
        let schema = generate_with_mock(&mock).await;

        let res = schema
            .execute(r#"{ user(id: "1") { firstName company { name } } }"#)
            .await;
        assert_eq!(
            data(res),
            json!({"user": {"firstName": "Ann", "company": {"name": "Acme"}}})
        );
        // One call for the user, exactly one more for the nested company.
        assert_eq!(mock.calls(), ["GET /users/1", "GET /companies/c1"]);
    }

    #[async_std::test]
    async fn test_user_without_company() {
        let mock = MockStore::new();
        let schema = generate_with_mock(&mock).await;

        let res = schema
            .execute(r#"{ user(id: "3") { firstName company { name } } }"#)
            .await;
        assert_eq!(
            data(res),
            json!({"user": {"firstName": "Cal", "company": null}})
        );
        // No companyId, no company lookup.
        assert_eq!(mock.calls(), ["GET /users/3"]);
    }

    #[async_std::test]
    async fn test_company_users() {
        let mock = MockStore::new();
        let schema = generate_with_mock(&mock).await;

        let res = schema
            .execute(r#"{ company(id: "c1") { name users { firstName age } } }"#)
            .await;
        assert_eq!(
            data(res),
            json!({"company": {
                "name": "Acme",
                "users": [
                    {"firstName": "Ann", "age": 25},
                    {"firstName": "Bo", "age": 31},
                ],
            }})
        );
        assert_eq!(mock.calls(), ["GET /companies/c1", "GET /companies/c1/users"]);
    }

    #[async_std::test]
    async fn test_store_failure_surfaces_as_graphql_error() {
        let mock = MockStore::new();
        let schema = generate_with_mock(&mock).await;

        let res = schema.execute(r#"{ user(id: "404") { firstName } }"#).await;
        // The failed field is null, the rest of the response survives, and the
        // error entry points at the field.
        assert_eq!(res.errors.len(), 1, "{:?}", res.errors);
        assert!(res.errors[0].message.contains("404"), "{:?}", res.errors);
        assert_eq!(res.errors[0].path, [PathSegment::Field("user".into())]);
        assert_eq!(res.data.into_json().unwrap(), json!({"user": null}));
    }

    #[async_std::test]
    async fn test_dangling_company_reference() {
        let mock = MockStore::new();
        let schema = generate_with_mock(&mock).await;

        // Dana's companyId points at a company the store no longer has. Only
        // the `company` field is nulled; Dana's own fields come through.
        let res = schema
            .execute(r#"{ user(id: "4") { firstName company { name } } }"#)
            .await;
        assert_eq!(res.errors.len(), 1, "{:?}", res.errors);
        assert_eq!(
            res.errors[0].path,
            [
                PathSegment::Field("user".into()),
                PathSegment::Field("company".into()),
            ]
        );
        assert_eq!(
            res.data.into_json().unwrap(),
            json!({"user": {"firstName": "Dana", "company": null}})
        );
        assert_eq!(mock.calls(), ["GET /users/4", "GET /companies/ghost"]);
    }

    #[async_std::test]
    async fn test_add_user() {
        let mock = MockStore::new();
        let schema = generate_with_mock(&mock).await;

        let res = schema
            .execute(r#"mutation { addUser(firstName: "Dee", age: 22) { id firstName age } }"#)
            .await;
        assert_eq!(
            data(res),
            json!({"addUser": {"id": "99", "firstName": "Dee", "age": 22}})
        );
        assert_eq!(mock.calls(), ["POST /users"]);
    }

    #[async_std::test]
    async fn test_add_user_requires_age() {
        let mock = MockStore::new();
        let schema = generate_with_mock(&mock).await;

        let res = schema
            .execute(r#"mutation { addUser(firstName: "Dee") { id } }"#)
            .await;
        assert!(!res.errors.is_empty());
        // Validation fails before any resolver runs, so the store sees nothing.
        assert_eq!(mock.calls(), Vec::<String>::new());
    }

    #[async_std::test]
    async fn test_delete_user() {
        let mock = MockStore::new();
        let schema = generate_with_mock(&mock).await;

        let res = schema
            .execute(r#"mutation { deleteUser(id: "1") { id } }"#)
            .await;
        // The delete is issued even though the store's empty response body
        // leaves the client with nothing to observe.
        assert_eq!(data(res), json!({"deleteUser": null}));
        assert_eq!(mock.calls(), ["DELETE /users/1"]);
    }

    #[async_std::test]
    async fn test_modify_user() {
        let mock = MockStore::new();
        let schema = generate_with_mock(&mock).await;

        let res = schema
            .execute(r#"mutation { modifyUser(id: "1", age: 26) { firstName age } }"#)
            .await;
        assert_eq!(
            data(res),
            json!({"modifyUser": {"firstName": "Ann", "age": 26}})
        );
        assert_eq!(mock.calls(), ["PATCH /users/1"]);
    }
}
