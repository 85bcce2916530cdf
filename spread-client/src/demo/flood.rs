use std::time::Instant;

use anyhow::{Context, Result};
use spread_client::{Connection, Message};
use tracing::info;

use crate::cli::FloodArgs;

pub fn run(connection: &Connection, args: &FloodArgs) -> Result<()> {
    let mut group = connection
        .join(&args.group)
        .with_context(|| format!("failed to join {}", args.group))?;

    let mut message = Message::new();
    message.set_reliability(args.reliability.into());
    message.set_self_discard(args.self_discard);
    message.add_group(args.group.as_str());
    message.set_data(vec![b'f'; args.size]);

    let started = Instant::now();
    for sent in 1..=args.count {
        connection
            .multicast(&message)
            .with_context(|| format!("send {sent} failed"))?;
        if sent % 1_000 == 0 {
            info!(sent, "flooding {}", args.group);
        }
    }

    let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
    let megabits = (args.count * args.size * 8) as f64 / 1_000_000.0;
    info!(
        "sent {} messages of {} bytes in {:.3}s ({:.2} Mbps)",
        args.count,
        args.size,
        elapsed,
        megabits / elapsed
    );

    group.leave()?;
    connection.disconnect()?;
    Ok(())
}
