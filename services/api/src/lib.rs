mod cli;
mod infra;
mod routes;
mod server;

use trustrail::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
