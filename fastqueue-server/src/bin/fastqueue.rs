#![warn(
    rust_2018_idioms,
    future_incompatible,
    missing_copy_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused,
    unused_qualifications,
    variant_size_differences
)]

//! fastqueue server binary.

#[macro_use]
extern crate log;

use dotenv::dotenv;
use hyper::{
    server::conn::AddrStream,
    service::{make_service_fn, service_fn},
    Body,
    Request,
    Response,
    Server,
};
use log::Level;
use std::{cell::Cell, convert::Infallible, env, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    runtime::{Builder, Runtime},
    sync::{oneshot::Sender, Mutex},
    time::sleep,
};

use fastqueue_common::{
    logger::{configure_logger, create_trace_id, json::new_stdout_logger, with_trace_id},
    router::{handle, Router},
    DEFAULT_MAX_MESSAGE_SIZE,
};
use fastqueue_server::{
    cleanup,
    config::Config,
    connection::{init_pool_maybe, DBConn, Pool},
    make_router,
    PgRepository,
};

struct RepoSource {
    pool: Pool,
}

impl RepoSource {
    fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

impl fastqueue_server::connection::Source<PgRepository> for RepoSource {
    fn get(&self) -> Option<PgRepository> {
        let conn: DBConn = self.pool.get().ok()?;
        Some(PgRepository::new(conn))
    }
}

struct HandlerService {
    pool:             Pool,
    router:           Router<(PgRepository, RepoSource)>,
    max_message_size: usize,
}

impl HandlerService {
    fn new(pool: Pool, router: Router<(PgRepository, RepoSource)>, max_message_size: usize) -> Self {
        Self {
            pool,
            router,
            max_message_size,
        }
    }

    async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let repo = self.pool.get().ok().map(PgRepository::new);
        handle(
            repo,
            RepoSource::new(self.pool.clone()),
            &self.router,
            self.max_message_size,
            req,
        )
        .await
    }
}

fn max_message_size() -> usize {
    match env::var("FASTQUEUE_MAX_MESSAGE_SIZE") {
        Err(_) => DEFAULT_MAX_MESSAGE_SIZE,
        Ok(s) => match s.parse::<usize>() {
            Err(err) => panic!("Failed to parse FASTQUEUE_MAX_MESSAGE_SIZE '{}': {}", s, err),
            Ok(n) if n < 1024 => panic!("FASTQUEUE_MAX_MESSAGE_SIZE must be at least 1024, got {}", n),
            Ok(n) => n,
        },
    }
}

#[cfg(unix)]
fn setup_signal_handler(rt: &Runtime, tx: Sender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let tx_mut = Arc::new(Mutex::new(Cell::new(Some(tx))));
    for signal_kind in [SignalKind::terminate(), SignalKind::interrupt()] {
        let tx_mut_clone = tx_mut.clone();
        rt.spawn(async move {
            let _ = signal(signal_kind).unwrap().recv().await;
            warn!("Received signal {:?}, starting shutdown", signal_kind);
            let lck = tx_mut_clone.lock().await;
            if let Some(tx) = lck.take() {
                let _ = tx.send(());
            }
        });
    }
}

#[cfg(windows)]
fn setup_signal_handler(rt: &Runtime, tx: Sender<()>) {
    use tokio::signal::ctrl_c;

    rt.spawn(async move {
        let _ = ctrl_c().await;
        warn!("Received ctrl-c, starting shutdown");
        let _ = tx.send(());
    });
}

fn main() {
    dotenv().ok();

    let logger: &'static _ = Box::leak(Box::new(new_stdout_logger(Level::Info)));
    configure_logger(logger);

    let config = Arc::new(Config::from_env());
    let (pool, _pool_size) = init_pool_maybe(&config).expect("Failed to initialize database pool");

    let rt = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(config.server_num_workers)
        .build()
        .expect("Failed to build tokio runtime");

    let service = Arc::new(HandlerService::new(
        pool.clone(),
        make_router(config.clone()),
        max_message_size(),
    ));

    rt.spawn(async {
        loop {
            sleep(Duration::from_secs(10)).await;
            logger.flush();
        }
    });

    cleanup::spawn(pool, Duration::from_secs(config.queue_cleanup_interval_seconds));

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    setup_signal_handler(&rt, tx);

    rt.block_on(async {
        let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
            .parse()
            .expect("invalid FASTQUEUE_SERVER_HOST/FASTQUEUE_SERVER_PORT");

        let make_service = make_service_fn(move |conn: &AddrStream| {
            let remote_addr = conn.remote_addr();
            info!("New connection from {}", remote_addr);
            let conn_service = Arc::clone(&service);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let req_service = Arc::clone(&conn_service);
                    let id = create_trace_id(&req);
                    async move { Ok::<_, Infallible>(with_trace_id(id, req_service.handle(req)).await) }
                }))
            }
        });

        let server = Server::bind(&addr).http1_keepalive(true).serve(make_service);

        info!("Started server on {}", addr);

        let graceful = server.with_graceful_shutdown(async {
            rx.await.ok();
        });

        if let Err(err) = graceful.await {
            error!("Server terminated with error: {}", err);
        } else {
            info!("Completed server shutdown");
        }

        logger.flush();
    });
}
