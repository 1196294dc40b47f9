use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::telegram::Update;

/// Message variants carried by an update, in the order they are inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    ChannelPost,
    EditedChannelPost,
    Message,
    EditedMessage,
}

impl Kind {
    pub const ALL: [Kind; 4] = [
        Kind::ChannelPost,
        Kind::EditedChannelPost,
        Kind::Message,
        Kind::EditedMessage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::ChannelPost => "channel_post",
            Kind::EditedChannelPost => "edited_channel_post",
            Kind::Message => "message",
            Kind::EditedMessage => "edited_message",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file destined for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub update_id: i64,
    pub kind: Kind,
    pub content: String,
}

impl Record {
    /// `{update_id:020}.{kind}.json`; zero padding keeps lexical order equal
    /// to numeric order.
    pub fn file_name(&self) -> String {
        format!("{:020}.{}.json", self.update_id, self.kind)
    }
}

/// Candidate records keyed by destination id, each list in arrival order.
pub type Groups = BTreeMap<i64, Vec<Record>>;

/// Split a poll batch into per-destination record lists. Kinds without a
/// destination id are skipped.
pub fn group_by_destination(updates: &[Update]) -> Result<Groups> {
    let mut groups = Groups::new();
    for update in updates {
        for kind in Kind::ALL {
            let Some(post) = update.post(kind) else {
                continue;
            };
            let Some(chat_id) = post.chat_id else {
                continue;
            };
            groups.entry(chat_id).or_default().push(Record {
                update_id: update.update_id,
                kind,
                content: post.to_json()?,
            });
        }
    }
    Ok(groups)
}

/// Keep only the target destination's records; everything else is dropped.
pub fn select(mut groups: Groups, target: i64) -> Vec<Record> {
    groups.remove(&target).unwrap_or_default()
}
