use maze_web::{FilterRegistry, Logger, ResponseBuffer, Server, handler_fn};
use tracing::{Level, info};

#[tokio::main]
async fn main() {
    let logger = Logger::fmt(Level::DEBUG);
    let mut registry = FilterRegistry::new().with_logger(logger);

    // runs for every request, before and after the rest of the chain
    registry.push(
        "",
        handler_fn(|ctx| {
            Box::pin(async move {
                info!(method = %ctx.method(), path = ctx.path(), "requesting");
                let result = ctx.proceed().await;
                info!(status = %ctx.response().status(), "responded");
                result
            })
        }),
    );

    registry.get(
        "/hello",
        handler_fn(|ctx| {
            Box::pin(async move {
                ctx.reply("Hello World!");
                Ok(())
            })
        }),
    );

    // group: every relative rule below is resolved against /users/
    registry.push("/users/*", (ResponseBuffer,));
    registry.get(
        ":id",
        handler_fn(|ctx| {
            Box::pin(async move {
                let id = ctx.path_params().get("id").unwrap_or_default().to_owned();
                ctx.reply(format!("user {id}"));
                ctx.response_mut().insert_header(http::header::CACHE_CONTROL, http::HeaderValue::from_static("no-store"));
                Ok(())
            })
        }),
    );

    let server = Server::builder().dispatcher(registry.build()).address("127.0.0.1:8080").build().unwrap();
    server.start().await;
}
