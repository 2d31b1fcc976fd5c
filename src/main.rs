use std::future::ready;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use roster::{app, initialize_state, telemetry};
use tokio::sync::watch;

/// Time left to queued events before exiting.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    telemetry::setup_logging();

    let runtime = match initialize_state().await {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "failed to initialize state");
            std::process::exit(1);
        },
    };
    let config = runtime.state.config.clone();

    let tracer = if config.telemetry.otlp {
        match telemetry::setup_tracer() {
            Ok(provider) => Some(provider),
            Err(err) => {
                tracing::warn!(error = %err, "OTLP exporter disabled");
                None
            },
        }
    } else {
        None
    };

    let recorder = match telemetry::setup_metrics_recorder() {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(error = %err, "failed to install metrics recorder");
            std::process::exit(1);
        },
    };

    let router = app(runtime.state)
        .route("/metrics", get(move || ready(recorder.render())));

    let (shutdown, signal) = watch::channel(false);
    let shutdown = Arc::new(shutdown);

    // a consumer that cannot subscribe stops the whole service.
    let replication = {
        let driver = runtime.driver;
        let signal = signal.clone();
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let result = driver.run(signal).await;
            if result.is_err() {
                let _ = shutdown.send(true);
            }
            result
        })
    };

    let listener = match tokio::net::TcpListener::bind(&config.address).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(address = %config.address, error = %err, "cannot bind address");
            std::process::exit(1);
        },
    };
    tracing::info!(address = %config.address, "listening");

    let mut server_signal = signal;
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = server_signal.wait_for(|stop| *stop).await;
    });

    tokio::spawn(async move {
        terminate().await;
        tracing::info!("shutdown requested");
        let _ = shutdown.send(true);
    });

    if let Err(err) = server.await {
        tracing::error!(error = %err, "server error");
    }

    let mut code = 0;
    match replication.await {
        Ok(Ok(())) => tracing::info!("replication stopped"),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "replication failed");
            code = 1;
        },
        Err(err) => {
            tracing::error!(error = %err, "replication task aborted");
            code = 1;
        },
    }

    runtime.producer.flush(FLUSH_TIMEOUT);
    if let Some(provider) = tracer {
        if let Err(err) = provider.shutdown() {
            tracing::warn!(error = %err, "tracer not flushed");
        }
    }

    std::process::exit(code);
}

/// Resolve on Ctrl+C or, on Unix, SIGTERM.
async fn terminate() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = sigterm => {},
    }
}
