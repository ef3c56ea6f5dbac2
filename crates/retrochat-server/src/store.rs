//! Append-only message log, one sequence per room.

use chrono::{DateTime, Utc};
use retrochat_core::{ChatMessage, RoomId, UserId, ValidationError, validate_message_text};
use std::collections::HashMap;

#[derive(Default)]
struct RoomLog {
    messages: Vec<ChatMessage>,
    next_seq: u64,
}

pub struct MessageStore {
    rooms: HashMap<RoomId, RoomLog>,
    /// message id -> (room, index in that room's log)
    index: HashMap<String, (RoomId, usize)>,
    max_message_chars: usize,
}

impl MessageStore {
    pub fn new(max_message_chars: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            index: HashMap::new(),
            max_message_chars,
        }
    }

    /// Append a message. Text must be non-blank and within the length limit.
    ///
    /// Timestamps within a room never go backwards, even if the wall clock does.
    pub fn append(
        &mut self,
        room_id: &RoomId,
        sender_id: &UserId,
        sender_name: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, ValidationError> {
        validate_message_text(text, self.max_message_chars)?;

        let log = self.rooms.entry(room_id.clone()).or_default();
        let timestamp = match log.messages.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        log.next_seq += 1;

        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.clone(),
            sender_id: sender_id.clone(),
            sender_name: sender_name.to_string(),
            text: text.to_string(),
            timestamp,
            seq: log.next_seq,
            read_count: 0,
        };

        self.index
            .insert(message.id.clone(), (room_id.clone(), log.messages.len()));
        log.messages.push(message.clone());
        Ok(message)
    }

    /// The `limit` most recent messages of a room, oldest first.
    pub fn history(&self, room_id: &RoomId, limit: usize) -> Vec<ChatMessage> {
        let Some(log) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        let start = log.messages.len().saturating_sub(limit);
        log.messages[start..].to_vec()
    }

    /// Bump a message's read counter. Unknown ids are ignored.
    pub fn increment_read_count(&mut self, message_id: &str) -> Option<u32> {
        let (room_id, pos) = self.index.get(message_id)?;
        let message = self.rooms.get_mut(room_id)?.messages.get_mut(*pos)?;
        message.read_count += 1;
        Some(message.read_count)
    }

    /// Ids of the last `n` messages `sender` posted in `room_id`, oldest first.
    pub fn latest_from(&self, room_id: &RoomId, sender: &UserId, n: usize) -> Vec<String> {
        let Some(log) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = log
            .messages
            .iter()
            .rev()
            .filter(|m| &m.sender_id == sender)
            .take(n)
            .map(|m| m.id.clone())
            .collect();
        ids.reverse();
        ids
    }

    pub fn get(&self, message_id: &str) -> Option<&ChatMessage> {
        let (room_id, pos) = self.index.get(message_id)?;
        self.rooms.get(room_id)?.messages.get(*pos)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn message_count(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> MessageStore {
        MessageStore::new(100)
    }

    #[test]
    fn rejects_blank() {
        let mut s = store();
        let room = RoomId::general();
        let err = s.append(&room, &UserId::new("u1"), "Zoe", "   ", Utc::now());
        assert_eq!(err, Err(ValidationError::EmptyMessage));
        assert_eq!(s.message_count(), 0);
    }

    #[test]
    fn rejects_too_long() {
        let mut s = MessageStore::new(3);
        let res = s.append(&RoomId::general(), &UserId::new("u1"), "Zoe", "abcd", Utc::now());
        assert!(matches!(res, Err(ValidationError::MessageTooLong { .. })));
    }

    #[test]
    fn sequence_is_per_room() {
        let mut s = store();
        let u = UserId::new("u1");
        let general = RoomId::general();
        let dm = RoomId::between(&u, &UserId::new("u2"));
        let now = Utc::now();

        assert_eq!(s.append(&general, &u, "Zoe", "a", now).unwrap().seq, 1);
        assert_eq!(s.append(&general, &u, "Zoe", "b", now).unwrap().seq, 2);
        assert_eq!(s.append(&dm, &u, "Zoe", "c", now).unwrap().seq, 1);
        assert_eq!(s.room_count(), 2);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut s = store();
        let u = UserId::new("u1");
        let room = RoomId::general();
        let now = Utc::now();
        let first = s.append(&room, &u, "Zoe", "a", now).unwrap();
        let second = s
            .append(&room, &u, "Zoe", "b", now - Duration::seconds(30))
            .unwrap();
        assert!(second.timestamp >= first.timestamp);
    }

    #[test]
    fn history_is_recent_and_ascending() {
        let mut s = store();
        let u = UserId::new("u1");
        let room = RoomId::general();
        for i in 0..10 {
            s.append(&room, &u, "Zoe", &format!("m{i}"), Utc::now()).unwrap();
        }
        let recent = s.history(&room, 3);
        let texts: Vec<&str> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["m7", "m8", "m9"]);
        assert_eq!(s.history(&room, 100).len(), 10);
        assert!(s.history(&RoomId::from_raw("room_x_y"), 5).is_empty());
    }

    #[test]
    fn history_is_idempotent() {
        let mut s = store();
        let u = UserId::new("u1");
        let room = RoomId::general();
        s.append(&room, &u, "Zoe", "one", Utc::now()).unwrap();
        s.append(&room, &u, "Zoe", "two", Utc::now()).unwrap();
        assert_eq!(s.history(&room, 50), s.history(&room, 50));
    }

    #[test]
    fn read_count_increments() {
        let mut s = store();
        let u = UserId::new("u1");
        let msg = s
            .append(&RoomId::general(), &u, "Zoe", "hi", Utc::now())
            .unwrap();
        assert_eq!(s.increment_read_count(&msg.id), Some(1));
        assert_eq!(s.increment_read_count(&msg.id), Some(2));
        assert_eq!(s.get(&msg.id).unwrap().read_count, 2);
        assert_eq!(s.increment_read_count("missing"), None);
    }

    #[test]
    fn latest_from_filters_sender() {
        let mut s = store();
        let zoe = UserId::new("u1");
        let max = UserId::new("u2");
        let room = RoomId::between(&zoe, &max);
        let a = s.append(&room, &max, "Max", "a", Utc::now()).unwrap();
        s.append(&room, &zoe, "Zoe", "b", Utc::now()).unwrap();
        let c = s.append(&room, &max, "Max", "c", Utc::now()).unwrap();

        assert_eq!(s.latest_from(&room, &max, 5), vec![a.id, c.id.clone()]);
        assert_eq!(s.latest_from(&room, &max, 1), vec![c.id]);
    }
}
