use async_graphql::http::graphiql_source;
use clap::Parser;
use model::{
    schema::{self, GatewaySchema},
    store,
};
use tide::{
    http::{headers, mime, Method},
    Request, Response, StatusCode,
};

mod test_runner;

/// Start the user graph gateway.
#[derive(Clone, Debug, Parser)]
struct Options {
    /// The port where the gateway should be served.
    #[clap(short, long, env = "USER_GRAPH_PORT", default_value = "4000")]
    port: u16,

    #[clap(flatten)]
    store: store::Options,
}

impl Options {
    /// Build the gateway and serve it until the process is killed.
    async fn serve(self) -> tide::Result<()> {
        let app = gateway(schema::generate(self.store.connect()));
        tracing::info!(port = self.port, store = %self.store.store_url, "gateway listening");
        app.listen(format!("0.0.0.0:{}", self.port)).await?;
        Ok(())
    }
}

/// Construct the gateway app serving `schema`.
///
/// `/graphql` executes queries and mutations (POST bodies or GET query
/// strings) and renders the GraphiQL console for browsers; `/` answers a
/// static line for manual liveness checks.
fn gateway(schema: GatewaySchema) -> tide::Server<()> {
    let mut app = tide::new();
    app.at("/")
        .get(|_| async { Ok("user graph gateway is up") });
    app.at("/graphql").all(move |req: Request<()>| {
        let schema = schema.clone();
        async move {
            if wants_console(&req) {
                let mut res = Response::new(StatusCode::Ok);
                res.set_content_type(mime::HTML);
                res.set_body(graphiql_source("/graphql", None));
                return Ok(res);
            }
            let request = async_graphql_tide::receive_request(req).await?;
            async_graphql_tide::respond(schema.execute(request).await)
        }
    });
    app
}

/// Browsers asking for HTML on GET are served the interactive console instead
/// of a query execution.
fn wants_console(req: &Request<()>) -> bool {
    req.method() == Method::Get
        && req
            .header(headers::ACCEPT)
            .map(|accept| {
                accept
                    .iter()
                    .any(|value| value.as_str().contains("text/html"))
            })
            .unwrap_or(false)
}

#[async_std::main]
async fn main() -> tide::Result<()> {
    model::init_logging();
    Options::parse().serve().await
}
