use maze_web::sse::{Event, SseBroker};
use maze_web::{FilterRegistry, Logger, Server};
use std::time::Duration;
use tracing::Level;

// try: curl -N http://127.0.0.1:8080/events
#[tokio::main]
async fn main() {
    let broker = SseBroker::new().on_connect(|| Ok(Event::data("welcome").with_name("connected")));

    let ticker = broker.clone();
    tokio::spawn(async move {
        let mut tick = 0_u64;
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if ticker.has_subscribers() {
                ticker.send(Event::data(tick.to_string()).with_id(tick.to_string())).await;
                tick += 1;
            }
        }
    });

    let mut registry = FilterRegistry::new().with_logger(Logger::fmt(Level::DEBUG));
    registry.get("/events", (broker,));

    let server = Server::builder().dispatcher(registry.build()).address("127.0.0.1:8080").build().unwrap();
    server.start().await;
}
