use anyhow::{Context, Result};
use spread_client::{Connection, Error};
use tracing::warn;

use crate::cli::ListenArgs;

use super::describe;

pub fn run(connection: &Connection, args: &ListenArgs) -> Result<()> {
    let mut groups = Vec::with_capacity(args.groups.len());
    for name in &args.groups {
        groups.push(
            connection
                .join(name)
                .with_context(|| format!("failed to join {name}"))?,
        );
    }

    let mut received = 0;
    while args.count.map_or(true, |count| received < count) {
        match connection.receive() {
            Ok(message) => {
                received += 1;
                println!("{}", describe(&message));
            }
            Err(Error::IllegalMessage) | Err(Error::MalformedMembership(_)) => {
                warn!("skipping a message the client could not decode");
            }
            Err(err) => return Err(err).context("receive failed"),
        }
    }

    for group in &mut groups {
        group.leave()?;
    }
    connection.disconnect()?;
    Ok(())
}
