//! Terminal programs built on the client library.

pub mod flood;
pub mod listen;
pub mod user;

use spread_client::{MembershipCause, Message};

/// One human readable line (or a few) describing a delivered message.
pub fn describe(message: &Message) -> String {
    let sender = message
        .sender()
        .map(|sender| sender.name().to_string())
        .unwrap_or_default();
    let groups = message
        .groups()
        .iter()
        .map(|group| group.name())
        .collect::<Vec<_>>()
        .join(", ");

    if message.is_reject() {
        return format!(
            "*** rejected message to [{groups}], {} bytes",
            message.data().len()
        );
    }

    let Some(info) = message.membership_info() else {
        return format!(
            "<{sender}> [{groups}] type {}: {}",
            message.message_type(),
            String::from_utf8_lossy(message.data())
        );
    };

    match info.cause() {
        MembershipCause::Transition => format!("*** transitional membership for {sender}"),
        MembershipCause::SelfLeave => format!("*** left group {sender}"),
        cause => {
            let change = match cause {
                MembershipCause::Join => format!("{} joined", name_of(info.joined())),
                MembershipCause::Leave => format!("{} left", name_of(info.left())),
                MembershipCause::Disconnect => {
                    format!("{} disconnected", name_of(info.disconnected()))
                }
                _ => {
                    let stayed = info
                        .stayed()
                        .map(|members| members.len())
                        .unwrap_or_default();
                    format!("network change, {stayed} stayed with us")
                }
            };
            let view = info
                .view_id()
                .map(|view| view.to_string())
                .unwrap_or_default();
            format!(
                "*** view ({view}) of {sender}: {change}; members [{groups}], we are #{}",
                message.message_type()
            )
        }
    }
}

fn name_of(member: Option<&spread_client::GroupHandle>) -> &str {
    member.map(|member| member.name()).unwrap_or("?")
}
