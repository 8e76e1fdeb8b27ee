// SPDX-License-Identifier: MIT
//! Daemon entry point. Single-threaded event loop per `spec.md` §5: one
//! worker process owns one index and one Bloom filter.

use fuzzhash_store::{Config, Worker};

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(err) => {
            tracing::error!(%err, "fatal configuration error");
            return std::process::ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(%err, "failed to start runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    let worker = Worker::new(config);
    match runtime.block_on(worker.run()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "fatal init error");
            std::process::ExitCode::FAILURE
        }
    }
}
