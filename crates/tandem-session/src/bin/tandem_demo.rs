//! Two editors sharing a buffer through an in-process relay.
//!
//! Runs on simulated time: the clock advances by the distance to the next
//! scheduler deadline instead of sleeping.

use std::time::Duration;

use tandem_common::telemetry::{self, TelemetryConfig};
use tandem_editor_core::{EditorSurface, MemorySurface};
use tandem_session::{
    HostTarget, Instant, LoopbackRelay, SessionConfig, SessionCoordinator, time_until,
};
use tracing::info;

const TICK: Duration = Duration::from_millis(10);

fn run_for(
    peers: &mut [&mut SessionCoordinator],
    clock: &mut Instant,
    total: Duration,
) {
    let end = *clock + total;
    while *clock < end {
        for peer in peers.iter_mut() {
            peer.poll(*clock);
        }
        let step = peers
            .iter()
            .filter_map(|p| time_until(p.next_deadline(), *clock))
            .min()
            .unwrap_or(TICK)
            .clamp(Duration::from_millis(1), TICK);
        *clock += step;
    }
}

fn print_notices(name: &str, coordinator: &mut SessionCoordinator) {
    for notice in coordinator.take_notices() {
        info!(peer = name, "{notice}");
    }
}

fn main() -> miette::Result<()> {
    telemetry::init(TelemetryConfig::from_env("tandem-demo"));

    let config = SessionConfig::default().with_default_server("loopback://relay");
    let relay: LoopbackRelay = LoopbackRelay::new();
    let mut clock = Instant::now();

    let alice_buf = MemorySurface::new("# Shopping\n- milk\n");
    let bob_buf = MemorySurface::default();
    let mut alice: SessionCoordinator = SessionCoordinator::new(config.clone());
    let mut bob: SessionCoordinator = SessionCoordinator::new(config);

    let code = alice
        .host(alice_buf.clone(), HostTarget::default_relay(), relay.transport(), clock)?
        .ok_or_else(|| miette::miette!("relay sessions always have a code"))?;
    let code = code.encode()?;
    run_for(&mut [&mut alice], &mut clock, Duration::from_millis(200));

    bob.join(bob_buf.clone(), &code, relay.transport(), clock)?;
    run_for(&mut [&mut alice, &mut bob], &mut clock, Duration::from_millis(200));
    print_notices("alice", &mut alice);
    print_notices("bob", &mut bob);

    alice_buf.insert_text(1, 6, " and eggs");
    alice.on_buffer_changed(clock);
    bob_buf.set_lines(2, 2, &["- bread"]);
    bob.on_buffer_changed(clock);
    run_for(&mut [&mut alice, &mut bob], &mut clock, Duration::from_millis(400));

    info!(status = %alice.statusline(), "alice");
    info!(status = %bob.statusline(), "bob");
    println!("alice:\n{}", alice_buf.content());
    println!("bob:\n{}", bob_buf.content());

    relay.set_online(false);
    run_for(&mut [&mut alice, &mut bob], &mut clock, Duration::from_millis(500));
    info!(status = %bob.statusline(), "relay down");
    relay.set_online(true);
    run_for(&mut [&mut alice, &mut bob], &mut clock, Duration::from_millis(1500));
    info!(status = %bob.statusline(), "relay back");
    print_notices("alice", &mut alice);
    print_notices("bob", &mut bob);

    alice.leave();
    bob.leave();
    Ok(())
}
