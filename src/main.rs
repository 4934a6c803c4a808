mod data;
mod distance;
mod model;
mod report;
mod scenario;
mod server;
mod session;
mod solver;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    server::run_server().await;
}
