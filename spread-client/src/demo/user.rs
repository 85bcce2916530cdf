use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use spread_client::{BasicListener, Connection, Group, Message, Reliability};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    select,
    sync::mpsc::{self, UnboundedReceiver},
    task,
};
use tracing::warn;

use crate::cli::UserArgs;

use super::describe;

const MENU: &str = "\
j <group>          join a group
l <group>          leave a group
s <group> <text>   send a message
b <group> <count>  send a burst of messages
r                  receive one message (with --pull)
p                  poll for a waiting message (with --pull)
q                  quit";

enum Input {
    Continue,
    Quit,
}

pub async fn run(connection: Connection, args: UserArgs) -> Result<()> {
    let (tx, mut delivered) = mpsc::unbounded_channel();
    let listener: Arc<dyn BasicListener> = Arc::new(move |message: &Message| {
        let _ = tx.send(message.clone());
    });
    if !args.pull {
        connection.add_basic_listener(Arc::clone(&listener))?;
    }

    let mut session = UserSession {
        connection: connection.clone(),
        groups: HashMap::new(),
    };

    write_stdout(MENU).await?;
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    run_user_loop(&mut session, &mut stdin, &mut input, &mut delivered).await?;

    if !args.pull {
        connection.remove_basic_listener(&listener)?;
    }
    task::spawn_blocking(move || connection.disconnect()).await??;
    Ok(())
}

struct UserSession {
    connection: Connection,
    groups: HashMap<String, Group>,
}

async fn run_user_loop(
    session: &mut UserSession,
    stdin: &mut BufReader<tokio::io::Stdin>,
    input: &mut String,
    delivered: &mut UnboundedReceiver<Message>,
) -> Result<()> {
    loop {
        input.clear();
        select! {
            message = delivered.recv() => {
                let Some(message) = message else { break };
                write_stdout(&describe(&message)).await?;
            }
            bytes_read = stdin.read_line(input) => {
                if bytes_read? == 0 {
                    break;
                }
                match handle_command(session, input.trim()).await {
                    Ok(Input::Continue) => {}
                    Ok(Input::Quit) => break,
                    Err(err) => write_stderr(&format!("!!! {err:#}")).await?,
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }
    Ok(())
}

async fn handle_command(session: &mut UserSession, line: &str) -> Result<Input> {
    let mut words = line.splitn(3, char::is_whitespace);
    let Some(command) = words.next().filter(|command| !command.is_empty()) else {
        return Ok(Input::Continue);
    };

    match command {
        "j" => {
            let name = argument(words.next(), "group")?.to_string();
            let connection = session.connection.clone();
            let joined = name.clone();
            let group = task::spawn_blocking(move || connection.join(&joined)).await??;
            session.groups.insert(name, group);
        }
        "l" => {
            let name = argument(words.next(), "group")?;
            let Some(mut group) = session.groups.remove(name) else {
                bail!("not a member of {name}");
            };
            task::spawn_blocking(move || group.leave()).await??;
        }
        "s" => {
            let name = argument(words.next(), "group")?;
            let message = text_message(name, words.next().unwrap_or_default());
            let connection = session.connection.clone();
            task::spawn_blocking(move || connection.multicast(&message)).await??;
        }
        "b" => {
            let name = argument(words.next(), "group")?;
            let count: usize = argument(words.next(), "count")?
                .parse()
                .context("count must be a number")?;
            let burst: Vec<Message> = (0..count)
                .map(|index| text_message(name, &format!("burst {index}")))
                .collect();
            let connection = session.connection.clone();
            task::spawn_blocking(move || connection.multicast_all(&burst)).await??;
        }
        "r" => {
            let connection = session.connection.clone();
            let message = task::spawn_blocking(move || connection.receive()).await??;
            write_stdout(&describe(&message)).await?;
        }
        "p" => {
            let waiting = session.connection.poll()?;
            write_stdout(&format!("*** message waiting: {waiting}")).await?;
        }
        "q" => return Ok(Input::Quit),
        _ => write_stdout(MENU).await?,
    }
    Ok(Input::Continue)
}

fn argument<'a>(word: Option<&'a str>, what: &str) -> Result<&'a str> {
    match word.map(str::trim) {
        Some(word) if !word.is_empty() => Ok(word),
        _ => bail!("missing {what}"),
    }
}

fn text_message(group: &str, text: &str) -> Message {
    let mut message = Message::new();
    message.set_reliability(Reliability::Safe);
    message.add_group(group);
    message.set_data(text.as_bytes().to_vec());
    message
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
