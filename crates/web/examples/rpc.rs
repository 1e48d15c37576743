use futures::FutureExt;
use maze_web::{BoxError, FilterRegistry, JsonRpc, Logger, RequestContext, Server};
use serde::{Deserialize, Serialize};
use tracing::Level;

#[derive(Deserialize)]
struct Pair {
    left: i64,
    right: i64,
}

#[derive(Serialize)]
struct Sum {
    value: i64,
}

fn build_rpc() -> Result<JsonRpc, BoxError> {
    let rpc = JsonRpc::new("/api/calc")
        .action("add", |_ctx: &mut RequestContext, pair: Pair| async move { Ok(Sum { value: pair.left + pair.right }) }.boxed())?
        .action("sub", |_ctx: &mut RequestContext, pair: Pair| async move { Ok(Sum { value: pair.left - pair.right }) }.boxed())?;
    Ok(rpc)
}

// try: curl -d '{"left": 1, "right": 2}' http://127.0.0.1:8080/api/calc/add
#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let mut registry = FilterRegistry::new().with_logger(Logger::fmt(Level::INFO));
    registry.push_rpc(build_rpc()?);

    let server = Server::builder().dispatcher(registry.build()).address("127.0.0.1:8080").build()?;
    server.start().await;
    Ok(())
}
