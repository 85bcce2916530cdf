//! Asynchronous delivery through listeners, including listener changes and
//! disconnects requested from inside a callback.

mod daemon;

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use anyhow::Result;
use daemon::{membership_payload, service_of, wait_until, Frame, MockDaemon, Script, MAILBOX};
use spread_client::{
    AdvancedListener, BasicListener, Connection, Error, Message, ServiceType,
};

const TIMEOUT: Duration = Duration::from_secs(5);

type Log = Arc<Mutex<Vec<String>>>;

fn connect(connection: &Connection) -> Result<daemon::Peer> {
    let daemon = MockDaemon::start()?;
    let options = daemon.options("alice")?;
    let server = daemon.serve(Script::default());
    connection.connect(&options)?;
    Ok(server.join().expect("daemon thread panicked")?)
}

fn text(message: &Message) -> String {
    String::from_utf8_lossy(message.data()).into_owned()
}

fn recorder(log: &Log, label: &'static str) -> Arc<dyn BasicListener> {
    let log = Arc::clone(log);
    Arc::new(move |message: &Message| {
        log.lock().unwrap().push(format!("{label}:{}", text(message)));
    })
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

struct Recorder {
    log: Log,
}

impl AdvancedListener for Recorder {
    fn regular_message_received(&self, message: &Message) {
        self.log
            .lock()
            .unwrap()
            .push(format!("regular:{}", text(message)));
    }

    fn membership_message_received(&self, message: &Message) {
        let entry = match message.membership_info() {
            Some(info) => format!("membership:{}", info.group()),
            None => format!("other:{}", text(message)),
        };
        self.log.lock().unwrap().push(entry);
    }
}

fn regular(peer: &mut daemon::Peer, data: &str) -> Result<()> {
    peer.send(&Frame::regular("#bob#daemon2", &["g1"], data.as_bytes()).bytes())
}

#[test]
fn basic_listeners_run_before_advanced_ones_in_registration_order() -> Result<()> {
    let connection = Connection::new();
    let log = Log::default();
    connection.add_basic_listener(recorder(&log, "a"))?;
    connection.add_basic_listener(recorder(&log, "b"))?;
    connection.add_advanced_listener(Arc::new(Recorder { log: Arc::clone(&log) }))?;

    // Listeners registered before connecting start delivery on connect.
    let mut peer = connect(&connection)?;
    regular(&mut peer, "1")?;
    regular(&mut peer, "2")?;

    wait_until(TIMEOUT, || entries(&log).len() == 6)?;
    assert_eq!(
        entries(&log),
        ["a:1", "b:1", "regular:1", "a:2", "b:2", "regular:2"]
    );
    Ok(())
}

#[test]
fn membership_messages_reach_the_membership_handler() -> Result<()> {
    let connection = Connection::new();
    let mut peer = connect(&connection)?;
    let log = Log::default();
    connection.add_advanced_listener(Arc::new(Recorder { log: Arc::clone(&log) }))?;

    let payload = membership_payload([2, 2, 2], &[&[MAILBOX]], 0);
    peer.send(
        &Frame {
            service_type: ServiceType::REG_MEMB | ServiceType::CAUSED_BY_JOIN,
            sender: "g1",
            groups: &[MAILBOX],
            message_type: 0,
            data: &payload,
            reject_of: None,
            flip: false,
        }
        .bytes(),
    )?;
    regular(&mut peer, "after")?;

    wait_until(TIMEOUT, || entries(&log).len() == 2)?;
    assert_eq!(entries(&log), ["membership:g1", "regular:after"]);
    Ok(())
}

#[test]
fn removal_inside_a_callback_takes_effect_after_the_round() -> Result<()> {
    let connection = Connection::new();
    let mut peer = connect(&connection)?;
    let log = Log::default();

    let second = recorder(&log, "second");
    let first: Arc<dyn BasicListener> = {
        let log = Arc::clone(&log);
        let connection = connection.clone();
        let second = Arc::clone(&second);
        Arc::new(move |message: &Message| {
            log.lock().unwrap().push(format!("first:{}", text(message)));
            if text(message) == "1" {
                connection
                    .remove_basic_listener(&second)
                    .expect("deferred removal");
            }
        })
    };
    connection.add_basic_listener(Arc::clone(&first))?;
    connection.add_basic_listener(Arc::clone(&second))?;

    regular(&mut peer, "1")?;
    regular(&mut peer, "2")?;

    wait_until(TIMEOUT, || entries(&log).len() == 3)?;
    // Give a late "second:2" the chance to show up if removal were lost.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(entries(&log), ["first:1", "second:1", "first:2"]);
    Ok(())
}

#[test]
fn rejects_reach_the_non_regular_handler() -> Result<()> {
    let connection = Connection::new();
    let mut peer = connect(&connection)?;
    let log = Log::default();
    connection.add_advanced_listener(Arc::new(Recorder { log: Arc::clone(&log) }))?;

    peer.send(
        &Frame {
            service_type: ServiceType::REJECT,
            sender: MAILBOX,
            groups: &["g1"],
            message_type: 0,
            data: b"bounced",
            reject_of: Some(ServiceType::AGREED),
            flip: false,
        }
        .bytes(),
    )?;
    regular(&mut peer, "after")?;

    wait_until(TIMEOUT, || entries(&log).len() == 2)?;
    assert_eq!(entries(&log), ["other:bounced", "regular:after"]);
    Ok(())
}

struct OneShot {
    connection: Connection,
    log: Log,
    me: Weak<OneShot>,
}

impl BasicListener for OneShot {
    fn message_received(&self, message: &Message) {
        self.log.lock().unwrap().push(format!("once:{}", text(message)));
        if let Some(me) = self.me.upgrade() {
            let me: Arc<dyn BasicListener> = me;
            self.connection
                .remove_basic_listener(&me)
                .expect("deferred removal");
        }
    }
}

#[test]
fn a_listener_can_remove_itself() -> Result<()> {
    let connection = Connection::new();
    let mut peer = connect(&connection)?;
    let log = Log::default();

    let once = Arc::new_cyclic(|me| OneShot {
        connection: connection.clone(),
        log: Arc::clone(&log),
        me: me.clone(),
    });
    let after = recorder(&log, "after");
    connection.add_basic_listener(once)?;
    connection.add_basic_listener(Arc::clone(&after))?;

    regular(&mut peer, "1")?;
    regular(&mut peer, "2")?;
    wait_until(TIMEOUT, || entries(&log).len() == 3)?;
    assert_eq!(entries(&log), ["once:1", "after:1", "after:2"]);

    // With no listeners left the dispatcher stops and pulling works again.
    connection.remove_basic_listener(&after)?;
    regular(&mut peer, "3")?;
    assert_eq!(text(&connection.receive()?), "3");
    assert_eq!(entries(&log).len(), 3);
    Ok(())
}

#[test]
fn receive_is_refused_while_listening_and_works_after_removal() -> Result<()> {
    let connection = Connection::new();
    let mut peer = connect(&connection)?;
    let log = Log::default();
    let listener = recorder(&log, "l");

    connection.add_basic_listener(Arc::clone(&listener))?;
    assert!(matches!(
        connection.receive(),
        Err(Error::ReceiveWhileListening)
    ));

    regular(&mut peer, "pushed")?;
    wait_until(TIMEOUT, || entries(&log).len() == 1)?;

    connection.remove_basic_listener(&listener)?;
    regular(&mut peer, "pulled")?;
    let message = connection.receive()?;
    assert_eq!(text(&message), "pulled");
    assert_eq!(entries(&log), ["l:pushed"]);
    Ok(())
}

#[test]
fn disconnect_from_a_callback_is_deferred_until_delivery_ends() -> Result<()> {
    let connection = Connection::new();
    let mut peer = connect(&connection)?;
    let log = Log::default();

    let quitter: Arc<dyn BasicListener> = {
        let log = Arc::clone(&log);
        let connection = connection.clone();
        Arc::new(move |message: &Message| {
            let result = connection.disconnect();
            log.lock()
                .unwrap()
                .push(format!("quit:{}:{}", text(message), result.is_ok()));
        })
    };
    connection.add_basic_listener(quitter)?;
    connection.add_basic_listener(recorder(&log, "after"))?;

    regular(&mut peer, "bye")?;

    let kill = peer.read_frame()?;
    assert_eq!(service_of(&kill), ServiceType::KILL.to_wire());
    wait_until(TIMEOUT, || !connection.is_connected())?;

    // Every listener saw the message before the session ended.
    assert_eq!(entries(&log), ["quit:bye:true", "after:bye"]);
    assert!(matches!(connection.disconnect(), Err(Error::NotConnected)));
    Ok(())
}

#[test]
fn panicking_listeners_do_not_stop_delivery() -> Result<()> {
    let connection = Connection::new();
    let mut peer = connect(&connection)?;
    let log = Log::default();

    connection.add_basic_listener(Arc::new(|_: &Message| panic!("listener bug")))?;
    connection.add_basic_listener(recorder(&log, "ok"))?;

    regular(&mut peer, "1")?;
    regular(&mut peer, "2")?;
    wait_until(TIMEOUT, || entries(&log).len() == 2)?;
    assert_eq!(entries(&log), ["ok:1", "ok:2"]);
    Ok(())
}
