//! Publish `My Printer._http._tcp.local.` on port 80 and log every
//! probe response and incoming query until a shutdown signal ends the
//! advertiser's goodbye.

use log::{debug, warn};
use mdns_toolkit::advertiser::{Advertiser, AdvertiserEvent, ServiceConfig};
use mdns_toolkit::socket::{local_addresses, Family, SocketCache};
use tokio::signal::unix::{signal, SignalKind};

/// Wait for whichever of SIGTERM/SIGINT/SIGHUP/SIGQUIT arrives first.
async fn wait_for_shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut sighup = signal(SignalKind::hangup()).expect("install SIGHUP handler");
    let mut sigquit = signal(SignalKind::quit()).expect("install SIGQUIT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
        _ = sighup.recv() => {}
        _ = sigquit.recv() => {}
    }
}

#[tokio::main]
pub async fn main() {
    pretty_env_logger::init_timed();

    let config = ServiceConfig {
        service: "http".into(),
        proto: "tcp".into(),
        instance: "My Printer".into(),
        domain: "local".into(),
        host: "myhost".into(),
        port: 80,
        txt: vec![b"key=value".to_vec()],
        goodbye: false,
        reannounce_at_half_ttl: false,
    };

    let local_addrs = local_addresses().expect("failed to enumerate local addresses");
    let (advertiser, mut events) = Advertiser::new(config, &local_addrs);
    let shutdown = advertiser.shutdown_handle();

    let cache = SocketCache::new();
    let socket = cache.acquire(Family::V4, true).expect("failed to bind the mDNS socket");

    tokio::spawn(async move {
        if let Err(e) = advertiser.run(socket).await {
            warn!("advertiser ended with an error: {e}");
        }
    });

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown.shutdown();
    });

    while let Some(event) = events.recv().await {
        match event {
            AdvertiserEvent::Listening(addr) => debug!("listening on {addr}"),
            AdvertiserEvent::Response(msg) => debug!("probe response: {} answers", msg.answers.len()),
            AdvertiserEvent::Query(msg) => debug!("query: {} questions", msg.questions.len()),
            AdvertiserEvent::Error(e) => warn!("advertiser error: {e}"),
            AdvertiserEvent::End => break,
        }
    }

    cache.release(Family::V4, true).ok();
}
