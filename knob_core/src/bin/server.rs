use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{error, info, warn};

use knob_core::serve::{
    oversized_request_reply, read_request_line, serve_requests, Incoming, RequestLine,
    MAX_REQUEST_BYTES,
};
use knob_core::{
    build_headless_app, load_knob_catalog_config_from_env, run_update, KnobMetrics,
    KnobRegistry, KnobServerConfig,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (catalog, metadata) = load_knob_catalog_config_from_env();
    let load = KnobRegistry::from_config(&catalog);
    let failed = load.failed_systems();
    if !failed.is_empty() {
        error!(
            target: "galactic::server",
            failed = ?failed,
            path = ?metadata.path(),
            "knob_server.systems_unavailable"
        );
    }
    let registry = load.registry;
    if registry.is_empty() {
        error!(target: "galactic::server", "knob_server.startup_failed=no_systems");
        std::process::exit(1);
    }

    let server_config = KnobServerConfig::from_env();
    let stop = Arc::new(AtomicBool::new(false));
    let requests = match spawn_request_listener(server_config.bind, Arc::clone(&stop)) {
        Ok(requests) => requests,
        Err(err) => {
            error!(
                target: "galactic::server",
                bind = %server_config.bind,
                error = %err,
                "knob_server.bind_failed"
            );
            std::process::exit(1);
        }
    };

    let mut app = build_headless_app(registry.clone());
    run_update(&mut app);

    info!(
        target: "galactic::server",
        bind = %server_config.bind,
        systems = ?registry.names().collect::<Vec<_>>(),
        "Galactic knob server ready"
    );

    let handled = serve_requests(&registry, &mut app, &requests);
    stop.store(true, Ordering::Relaxed);

    let metrics = app.world.resource::<KnobMetrics>();
    info!(
        target: "galactic::server",
        requests = handled,
        batches = metrics.batches,
        applied = metrics.applied,
        rejected = metrics.rejected,
        clamped = metrics.clamped,
        "knob_server.shutdown"
    );
    registry.shutdown();
}

fn spawn_request_listener(
    bind_addr: SocketAddr,
    stop: Arc<AtomicBool>,
) -> std::io::Result<Receiver<Incoming>> {
    let listener = TcpListener::bind(bind_addr)?;
    listener.set_nonblocking(true)?;

    let (sender, receiver) = unbounded::<Incoming>();
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    info!(target: "galactic::server", %addr, "client.connected");
                    let sender = sender.clone();
                    thread::spawn(move || handle_client(stream, sender));
                }
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(err) => {
                    warn!(target: "galactic::server", error = %err, "client.accept_failed");
                    thread::sleep(Duration::from_millis(200));
                }
            }
        }
        info!(target: "galactic::server", "listener.stopped");
    });

    Ok(receiver)
}

fn handle_client(stream: TcpStream, sender: Sender<Incoming>) {
    if let Err(err) = stream.set_nonblocking(false) {
        warn!(target: "galactic::server", error = %err, "client.blocking_mode_failed");
        return;
    }
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(err) => {
            warn!(target: "galactic::server", error = %err, "client.clone_failed");
            return;
        }
    };
    let mut reader = BufReader::new(stream);
    loop {
        let line = match read_request_line(&mut reader, MAX_REQUEST_BYTES) {
            Ok(RequestLine::Line(line)) => line,
            Ok(RequestLine::Closed) => break,
            Ok(RequestLine::TooLong) => {
                warn!(
                    target: "galactic::server",
                    limit = MAX_REQUEST_BYTES,
                    "client.request_too_long"
                );
                // The rest of the oversized line cannot be resynchronised.
                let _ = writeln!(writer, "{}", oversized_request_reply(MAX_REQUEST_BYTES));
                break;
            }
            Err(err) => {
                warn!(target: "galactic::server", error = %err, "client.read_failed");
                break;
            }
        };

        let (reply_tx, reply_rx) = bounded::<String>(1);
        if sender.send(Incoming { line, reply: reply_tx }).is_err() {
            break;
        }
        let Ok(response) = reply_rx.recv() else {
            break;
        };
        if let Err(err) = writeln!(writer, "{response}") {
            warn!(target: "galactic::server", error = %err, "client.write_failed");
            break;
        }
    }
}
