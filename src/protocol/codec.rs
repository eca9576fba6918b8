//! Protocol codec for encoding/decoding messages
//!
//! All multi-byte fields are little-endian. Encoding is total for every
//! message value; decoding only fails on a short buffer or an unknown type.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use super::message::message_type as mt;
use super::message::{
    ClientMessage, DeviceMessage, EventKind, EventToServer, GameStart, HostMessage, PlayerRecord,
    RosterSnapshot, ServerMessage,
};
use super::{FRAME_TERMINATOR, MAX_FRAME_LEN};

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated message: needed {needed} more byte(s)")]
    Truncated { needed: usize },

    #[error("Unknown message type: {0}")]
    UnknownType(u8),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

fn take_u8(buf: &mut &[u8]) -> DecodeResult<u8> {
    if buf.remaining() < 1 {
        return Err(DecodeError::Truncated { needed: 1 });
    }
    Ok(buf.get_u8())
}

fn take_i16(buf: &mut &[u8]) -> DecodeResult<i16> {
    if buf.remaining() < 2 {
        return Err(DecodeError::Truncated {
            needed: 2 - buf.remaining(),
        });
    }
    Ok(buf.get_i16_le())
}

fn take_bytes<'a>(buf: &mut &'a [u8], len: usize) -> DecodeResult<&'a [u8]> {
    if buf.len() < len {
        return Err(DecodeError::Truncated {
            needed: len - buf.len(),
        });
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

impl DeviceMessage {
    /// Encode as the fixed two-byte device layout `[type, payload]`
    pub fn encode(&self, buf: &mut BytesMut) {
        let (kind, payload) = match self {
            DeviceMessage::Ping => (mt::PING, 0),
            DeviceMessage::GunShot => (mt::GUN_SHOT, 0),
            DeviceMessage::GunReload => (mt::GUN_RELOAD, 0),
            DeviceMessage::GotHit { attacker_id } => (mt::GOT_HIT, *attacker_id),
        };
        buf.put_u8(kind);
        buf.put_u8(payload);
    }

    /// Decode a device frame (terminator already stripped)
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let mut buf = bytes;
        match take_u8(&mut buf)? {
            mt::PING => Ok(DeviceMessage::Ping),
            mt::GUN_SHOT => Ok(DeviceMessage::GunShot),
            mt::GUN_RELOAD => Ok(DeviceMessage::GunReload),
            mt::GOT_HIT => Ok(DeviceMessage::GotHit {
                attacker_id: take_u8(&mut buf)?,
            }),
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}

impl HostMessage {
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            HostMessage::Ping => buf.put_u8(mt::PING),
            HostMessage::DeviceState {
                player_id,
                team_id,
                state,
                bullets_left,
            } => {
                buf.put_u8(mt::DEVICE_STATE);
                buf.put_u8(*player_id);
                buf.put_u8(*team_id);
                buf.put_u8(*state);
                buf.put_u8(*bullets_left);
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let mut buf = bytes;
        match take_u8(&mut buf)? {
            mt::PING => Ok(HostMessage::Ping),
            mt::DEVICE_STATE => Ok(HostMessage::DeviceState {
                player_id: take_u8(&mut buf)?,
                team_id: take_u8(&mut buf)?,
                state: take_u8(&mut buf)?,
                bullets_left: take_u8(&mut buf)?,
            }),
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}

impl ServerMessage {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.type_id());
        match self {
            ServerMessage::Ping => {}
            ServerMessage::GunShot { player_id }
            | ServerMessage::GunReload { player_id }
            | ServerMessage::Respawn { player_id }
            | ServerMessage::NoBullets { player_id } => buf.put_u8(*player_id),
            ServerMessage::YouHitSomeone { victim_id } | ServerMessage::YouScored { victim_id } => {
                buf.put_u8(*victim_id)
            }
            ServerMessage::GotHit { attacker_id } => buf.put_u8(*attacker_id),
            ServerMessage::YouKilled { killer_id } => buf.put_u8(*killer_id),
            ServerMessage::GameOver { winner_id } => buf.put_u8(*winner_id),
            ServerMessage::GameStart(start) => {
                buf.put_u8(start.team_play as u8);
                buf.put_u8(start.respawn_time);
                buf.put_u8(start.game_minutes);
                buf.put_u8(start.start_delay);
            }
            ServerMessage::RosterSnapshot(snapshot) => encode_snapshot(snapshot, buf),
            ServerMessage::TimeUpdate { minutes, seconds } => {
                buf.put_u8(*minutes);
                buf.put_u8(*seconds);
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let mut buf = bytes;
        let message = match take_u8(&mut buf)? {
            mt::PING => ServerMessage::Ping,
            mt::GUN_SHOT => ServerMessage::GunShot {
                player_id: take_u8(&mut buf)?,
            },
            mt::GUN_RELOAD => ServerMessage::GunReload {
                player_id: take_u8(&mut buf)?,
            },
            mt::YOU_HIT_SOMEONE => ServerMessage::YouHitSomeone {
                victim_id: take_u8(&mut buf)?,
            },
            mt::GOT_HIT => ServerMessage::GotHit {
                attacker_id: take_u8(&mut buf)?,
            },
            mt::RESPAWN => ServerMessage::Respawn {
                player_id: take_u8(&mut buf)?,
            },
            mt::GAME_OVER => ServerMessage::GameOver {
                winner_id: take_u8(&mut buf)?,
            },
            mt::GAME_START => ServerMessage::GameStart(GameStart {
                team_play: take_u8(&mut buf)? != 0,
                respawn_time: take_u8(&mut buf)?,
                game_minutes: take_u8(&mut buf)?,
                start_delay: take_u8(&mut buf)?,
            }),
            mt::YOU_KILLED => ServerMessage::YouKilled {
                killer_id: take_u8(&mut buf)?,
            },
            mt::YOU_SCORED => ServerMessage::YouScored {
                victim_id: take_u8(&mut buf)?,
            },
            mt::ROSTER_SNAPSHOT => ServerMessage::RosterSnapshot(decode_snapshot(&mut buf)?),
            mt::NO_BULLETS => ServerMessage::NoBullets {
                player_id: take_u8(&mut buf)?,
            },
            mt::TIME_UPDATE => ServerMessage::TimeUpdate {
                minutes: take_u8(&mut buf)?,
                seconds: take_u8(&mut buf)?,
            },
            other => return Err(DecodeError::UnknownType(other)),
        };
        Ok(message)
    }
}

/// Most player rows a snapshot can carry
pub const MAX_SNAPSHOT_PLAYERS: usize = u8::MAX as usize;

fn encode_snapshot(snapshot: &RosterSnapshot, buf: &mut BytesMut) {
    buf.put_u8(snapshot.game_running as u8);
    buf.put_u8(snapshot.team_play as u8);
    buf.put_i16_le(snapshot.game_timer_seconds);
    // The count is a single byte; rows past it would be read as garbage
    let count = snapshot.players.len().min(MAX_SNAPSHOT_PLAYERS);
    buf.put_u8(count as u8);
    for player in snapshot.players.iter().take(count) {
        buf.put_u8(player.id);
        buf.put_u8(player.health);
        buf.put_u8(player.score);
        buf.put_u8(player.team_id);
        buf.put_u8(player.damage);
        buf.put_u8(player.bullets_left);
        let name = player.name.as_bytes();
        let len = name.len().min(u8::MAX as usize);
        buf.put_u8(len as u8);
        buf.put_slice(&name[..len]);
    }
}

fn decode_snapshot(buf: &mut &[u8]) -> DecodeResult<RosterSnapshot> {
    let game_running = take_u8(buf)? != 0;
    let team_play = take_u8(buf)? != 0;
    let game_timer_seconds = take_i16(buf)?;
    let count = take_u8(buf)? as usize;

    let mut players = Vec::with_capacity(count);
    for _ in 0..count {
        let id = take_u8(buf)?;
        let health = take_u8(buf)?;
        let score = take_u8(buf)?;
        let team_id = take_u8(buf)?;
        let damage = take_u8(buf)?;
        let bullets_left = take_u8(buf)?;
        let name_len = take_u8(buf)? as usize;
        let name = String::from_utf8_lossy(take_bytes(buf, name_len)?).into_owned();
        players.push(PlayerRecord {
            id,
            health,
            score,
            team_id,
            damage,
            bullets_left,
            name,
        });
    }

    Ok(RosterSnapshot {
        game_running,
        team_play,
        game_timer_seconds,
        players,
    })
}

impl ClientMessage {
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            ClientMessage::Heartbeat {
                player_id,
                first_contact,
            } => {
                buf.put_u8(mt::PING);
                buf.put_u8(*player_id);
                buf.put_u8(*first_contact as u8);
            }
            ClientMessage::Event(event) => {
                buf.put_u8(event.kind as u8);
                buf.put_u8(event.player_id);
                buf.put_u8(event.other_id);
                buf.put_u8(event.health);
                buf.put_u8(event.score);
                buf.put_u8(event.bullets_left);
                buf.put_u8(event.team_id);
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let mut buf = bytes;
        let kind = take_u8(&mut buf)?;
        if kind == mt::PING {
            return Ok(ClientMessage::Heartbeat {
                player_id: take_u8(&mut buf)?,
                first_contact: take_u8(&mut buf)? != 0,
            });
        }
        let kind = EventKind::from_u8(kind).ok_or(DecodeError::UnknownType(kind))?;
        Ok(ClientMessage::Event(EventToServer {
            kind,
            player_id: take_u8(&mut buf)?,
            other_id: take_u8(&mut buf)?,
            health: take_u8(&mut buf)?,
            score: take_u8(&mut buf)?,
            bullets_left: take_u8(&mut buf)?,
            team_id: take_u8(&mut buf)?,
        }))
    }
}

/// Wrap an encoded host message into a serial frame (payload + terminator)
///
/// No escaping is applied: a payload byte equal to the terminator will split
/// the frame on the receiving side.
pub fn encode_frame(message: &HostMessage) -> BytesMut {
    let mut buf = BytesMut::with_capacity(8);
    message.encode(&mut buf);
    buf.put_u8(FRAME_TERMINATOR);
    buf
}

/// Splits a serial byte stream into terminator-delimited frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Append raw bytes received from the link
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Return the next complete frame without its terminator
    ///
    /// Empty frames are skipped. If the pending bytes exceed the maximum frame
    /// length without a terminator they are discarded and `Err` reports how
    /// many bytes were dropped.
    pub fn next_frame(&mut self) -> Result<Option<BytesMut>, usize> {
        loop {
            match self.buf.iter().position(|b| *b == FRAME_TERMINATOR) {
                Some(pos) => {
                    let frame = self.buf.split_to(pos);
                    self.buf.advance(1);
                    if frame.is_empty() {
                        continue;
                    }
                    return Ok(Some(frame));
                }
                None if self.buf.len() > MAX_FRAME_LEN => {
                    let dropped = self.buf.len();
                    self.buf.clear();
                    return Err(dropped);
                }
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_device_message() -> impl Strategy<Value = DeviceMessage> {
        prop_oneof![
            Just(DeviceMessage::Ping),
            Just(DeviceMessage::GunShot),
            Just(DeviceMessage::GunReload),
            any::<u8>().prop_map(|attacker_id| DeviceMessage::GotHit { attacker_id }),
        ]
    }

    fn arb_host_message() -> impl Strategy<Value = HostMessage> {
        prop_oneof![
            Just(HostMessage::Ping),
            (any::<u8>(), any::<u8>(), 0u8..=3, any::<u8>()).prop_map(
                |(player_id, team_id, state, bullets_left)| HostMessage::DeviceState {
                    player_id,
                    team_id,
                    state,
                    bullets_left,
                }
            ),
        ]
    }

    fn arb_player_record() -> impl Strategy<Value = PlayerRecord> {
        (
            any::<u8>(),
            any::<u8>(),
            any::<u8>(),
            any::<u8>(),
            any::<u8>(),
            any::<u8>(),
            "[a-zA-Z0-9 ]{0,24}",
        )
            .prop_map(
                |(id, health, score, team_id, damage, bullets_left, name)| PlayerRecord {
                    id,
                    health,
                    score,
                    team_id,
                    damage,
                    bullets_left,
                    name,
                },
            )
    }

    fn arb_server_message() -> impl Strategy<Value = ServerMessage> {
        prop_oneof![
            Just(ServerMessage::Ping),
            any::<u8>().prop_map(|player_id| ServerMessage::GunShot { player_id }),
            any::<u8>().prop_map(|player_id| ServerMessage::GunReload { player_id }),
            any::<u8>().prop_map(|victim_id| ServerMessage::YouHitSomeone { victim_id }),
            any::<u8>().prop_map(|attacker_id| ServerMessage::GotHit { attacker_id }),
            any::<u8>().prop_map(|player_id| ServerMessage::Respawn { player_id }),
            any::<u8>().prop_map(|winner_id| ServerMessage::GameOver { winner_id }),
            (any::<bool>(), any::<u8>(), any::<u8>(), any::<u8>()).prop_map(
                |(team_play, respawn_time, game_minutes, start_delay)| {
                    ServerMessage::GameStart(GameStart {
                        team_play,
                        respawn_time,
                        game_minutes,
                        start_delay,
                    })
                }
            ),
            any::<u8>().prop_map(|killer_id| ServerMessage::YouKilled { killer_id }),
            any::<u8>().prop_map(|victim_id| ServerMessage::YouScored { victim_id }),
            (
                any::<bool>(),
                any::<bool>(),
                any::<i16>(),
                prop::collection::vec(arb_player_record(), 0..12),
            )
                .prop_map(|(game_running, team_play, game_timer_seconds, players)| {
                    ServerMessage::RosterSnapshot(RosterSnapshot {
                        game_running,
                        team_play,
                        game_timer_seconds,
                        players,
                    })
                }),
            any::<u8>().prop_map(|player_id| ServerMessage::NoBullets { player_id }),
            (any::<u8>(), 0u8..60)
                .prop_map(|(minutes, seconds)| ServerMessage::TimeUpdate { minutes, seconds }),
        ]
    }

    fn arb_event_kind() -> impl Strategy<Value = EventKind> {
        prop::sample::select(vec![
            EventKind::GunShot,
            EventKind::GunReload,
            EventKind::YouHitSomeone,
            EventKind::GotHit,
            EventKind::Respawn,
            EventKind::YouKilled,
            EventKind::YouScored,
            EventKind::NoBullets,
        ])
    }

    fn arb_client_message() -> impl Strategy<Value = ClientMessage> {
        prop_oneof![
            (any::<u8>(), any::<bool>()).prop_map(|(player_id, first_contact)| {
                ClientMessage::Heartbeat {
                    player_id,
                    first_contact,
                }
            }),
            (
                arb_event_kind(),
                any::<u8>(),
                any::<u8>(),
                any::<u8>(),
                any::<u8>(),
                any::<u8>(),
                any::<u8>(),
            )
                .prop_map(
                    |(kind, player_id, other_id, health, score, bullets_left, team_id)| {
                        ClientMessage::Event(EventToServer {
                            kind,
                            player_id,
                            other_id,
                            health,
                            score,
                            bullets_left,
                            team_id,
                        })
                    }
                ),
        ]
    }

    /// Frame payloads that never contain the terminator
    fn arb_frames() -> impl Strategy<Value = Vec<Vec<u8>>> {
        let byte = any::<u8>().prop_filter("terminator", |b| *b != FRAME_TERMINATOR);
        prop::collection::vec(prop::collection::vec(byte, 1..=MAX_FRAME_LEN), 1..8)
    }

    proptest! {
        #[test]
        fn prop_device_message_roundtrip(message in arb_device_message()) {
            let mut buf = BytesMut::new();
            message.encode(&mut buf);
            prop_assert_eq!(buf.len(), 2);
            prop_assert_eq!(DeviceMessage::decode(&buf), Ok(message));
        }

        #[test]
        fn prop_host_message_roundtrip(message in arb_host_message()) {
            let mut buf = BytesMut::new();
            message.encode(&mut buf);
            prop_assert_eq!(HostMessage::decode(&buf), Ok(message));
        }

        #[test]
        fn prop_server_message_roundtrip(message in arb_server_message()) {
            let mut buf = BytesMut::new();
            message.encode(&mut buf);
            prop_assert_eq!(buf[0], message.type_id());
            prop_assert_eq!(ServerMessage::decode(&buf), Ok(message));
        }

        #[test]
        fn prop_client_message_roundtrip(message in arb_client_message()) {
            let mut buf = BytesMut::new();
            message.encode(&mut buf);
            prop_assert_eq!(ClientMessage::decode(&buf), Ok(message));
        }

        #[test]
        fn prop_frames_survive_any_split(frames in arb_frames(), cut in any::<prop::sample::Index>()) {
            let mut stream = Vec::new();
            for frame in &frames {
                stream.extend_from_slice(frame);
                stream.push(FRAME_TERMINATOR);
            }
            let cut = cut.index(stream.len() + 1);

            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            for chunk in [&stream[..cut], &stream[cut..]] {
                decoder.extend(chunk);
                while let Some(frame) = decoder.next_frame().unwrap() {
                    decoded.push(frame.to_vec());
                }
            }
            prop_assert_eq!(decoded, frames);
        }
    }

    fn server_roundtrip(message: ServerMessage) {
        let mut buf = BytesMut::new();
        message.encode(&mut buf);
        assert_eq!(ServerMessage::decode(&buf).unwrap(), message);
    }

    #[test]
    fn test_server_messages_roundtrip() {
        let messages = vec![
            ServerMessage::Ping,
            ServerMessage::GunShot { player_id: 4 },
            ServerMessage::GunReload { player_id: 4 },
            ServerMessage::YouHitSomeone { victim_id: 9 },
            ServerMessage::GotHit { attacker_id: 2 },
            ServerMessage::Respawn { player_id: 0 },
            ServerMessage::GameOver { winner_id: 255 },
            ServerMessage::GameStart(GameStart {
                team_play: true,
                respawn_time: 10,
                game_minutes: 15,
                start_delay: 5,
            }),
            ServerMessage::YouKilled { killer_id: 3 },
            ServerMessage::YouScored { victim_id: 7 },
            ServerMessage::RosterSnapshot(RosterSnapshot {
                game_running: true,
                team_play: false,
                game_timer_seconds: 600,
                players: vec![
                    PlayerRecord {
                        id: 1,
                        health: 100,
                        score: 3,
                        team_id: 0,
                        damage: 25,
                        bullets_left: 8,
                        name: "Alice".to_string(),
                    },
                    PlayerRecord {
                        id: 2,
                        health: 0,
                        score: 5,
                        team_id: 1,
                        damage: 10,
                        bullets_left: 0,
                        name: String::new(),
                    },
                ],
            }),
            ServerMessage::NoBullets { player_id: 1 },
            ServerMessage::TimeUpdate {
                minutes: 12,
                seconds: 59,
            },
        ];

        for message in messages {
            server_roundtrip(message);
        }
    }

    #[test]
    fn test_device_and_host_messages_roundtrip() {
        for message in [
            DeviceMessage::Ping,
            DeviceMessage::GunShot,
            DeviceMessage::GunReload,
            DeviceMessage::GotHit { attacker_id: 200 },
        ] {
            let mut buf = BytesMut::new();
            message.encode(&mut buf);
            assert_eq!(buf.len(), 2);
            assert_eq!(DeviceMessage::decode(&buf).unwrap(), message);
        }

        for message in [
            HostMessage::Ping,
            HostMessage::DeviceState {
                player_id: 1,
                team_id: 2,
                state: 3,
                bullets_left: 4,
            },
        ] {
            let mut buf = BytesMut::new();
            message.encode(&mut buf);
            assert_eq!(HostMessage::decode(&buf).unwrap(), message);
        }
    }

    #[test]
    fn test_client_messages_layout() {
        let mut buf = BytesMut::new();
        ClientMessage::Heartbeat {
            player_id: 7,
            first_contact: true,
        }
        .encode(&mut buf);
        assert_eq!(&buf[..], &[1, 7, 1]);

        let event = ClientMessage::Event(EventToServer {
            kind: EventKind::GotHit,
            player_id: 1,
            other_id: 2,
            health: 75,
            score: 4,
            bullets_left: 6,
            team_id: 1,
        });
        let mut buf = BytesMut::new();
        event.encode(&mut buf);
        assert_eq!(&buf[..], &[5, 1, 2, 75, 4, 6, 1]);
        assert_eq!(ClientMessage::decode(&buf).unwrap(), event);
    }

    #[test]
    fn test_snapshot_timer_is_little_endian() {
        let snapshot = ServerMessage::RosterSnapshot(RosterSnapshot {
            game_running: false,
            team_play: false,
            game_timer_seconds: 0x0102,
            players: Vec::new(),
        });
        let mut buf = BytesMut::new();
        snapshot.encode(&mut buf);
        assert_eq!(&buf[..], &[11, 0, 0, 0x02, 0x01, 0]);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            ServerMessage::decode(&[]),
            Err(DecodeError::Truncated { needed: 1 })
        );
        assert_eq!(
            ServerMessage::decode(&[99]),
            Err(DecodeError::UnknownType(99))
        );
        assert_eq!(
            ServerMessage::decode(&[8, 1, 10]),
            Err(DecodeError::Truncated { needed: 1 })
        );
        // snapshot announcing one player with a 5-byte name but only 2 present
        assert_eq!(
            ServerMessage::decode(&[11, 1, 0, 0, 0, 1, 1, 100, 0, 0, 10, 5, 5, b'a', b'b']),
            Err(DecodeError::Truncated { needed: 3 })
        );
        assert_eq!(
            DeviceMessage::decode(&[5]),
            Err(DecodeError::Truncated { needed: 1 })
        );
        assert_eq!(
            DeviceMessage::decode(&[13, 0]),
            Err(DecodeError::UnknownType(13))
        );
    }

    #[test]
    fn test_frame_got_hit() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[5, 3, FRAME_TERMINATOR]);
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(
            DeviceMessage::decode(&frame).unwrap(),
            DeviceMessage::GotHit { attacker_id: 3 }
        );
        assert_eq!(decoder.next_frame(), Ok(None));
    }

    #[test]
    fn test_frames_split_across_reads() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[2, 0, FRAME_TERMINATOR, 5]);
        assert_eq!(&decoder.next_frame().unwrap().unwrap()[..], &[2, 0]);
        assert_eq!(decoder.next_frame(), Ok(None));

        decoder.extend(&[9, FRAME_TERMINATOR, FRAME_TERMINATOR]);
        assert_eq!(&decoder.next_frame().unwrap().unwrap()[..], &[5, 9]);
        // the stray terminator yields an empty frame, which is skipped
        assert_eq!(decoder.next_frame(), Ok(None));
    }

    #[test]
    fn test_terminator_inside_payload_splits_frame() {
        // No escaping exists: attacker id 125 collides with the terminator.
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[5, FRAME_TERMINATOR, FRAME_TERMINATOR]);
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(&frame[..], &[5]);
        assert_eq!(
            DeviceMessage::decode(&frame),
            Err(DecodeError::Truncated { needed: 1 })
        );
    }

    #[test]
    fn test_oversized_frame_is_discarded() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[7u8; MAX_FRAME_LEN + 1]);
        assert_eq!(decoder.next_frame(), Err(MAX_FRAME_LEN + 1));
        decoder.extend(&[3, 0, FRAME_TERMINATOR]);
        assert_eq!(&decoder.next_frame().unwrap().unwrap()[..], &[3, 0]);
    }

    #[test]
    fn test_encode_frame_appends_terminator() {
        let frame = encode_frame(&HostMessage::DeviceState {
            player_id: 1,
            team_id: 0,
            state: 1,
            bullets_left: 10,
        });
        assert_eq!(&frame[..], &[13, 1, 0, 1, 10, FRAME_TERMINATOR]);
    }

    fn snapshot_with(count: usize) -> RosterSnapshot {
        RosterSnapshot {
            game_running: true,
            team_play: false,
            game_timer_seconds: 30,
            players: (0..count)
                .map(|i| PlayerRecord {
                    id: i as u8,
                    health: 100,
                    score: 0,
                    team_id: 0,
                    damage: 10,
                    bullets_left: 5,
                    name: format!("p{}", i),
                })
                .collect(),
        }
    }

    #[test]
    fn test_snapshot_player_count_boundary() {
        let full = snapshot_with(MAX_SNAPSHOT_PLAYERS);
        let mut buf = BytesMut::new();
        ServerMessage::RosterSnapshot(full.clone()).encode(&mut buf);
        assert_eq!(
            ServerMessage::decode(&buf).unwrap(),
            ServerMessage::RosterSnapshot(full.clone())
        );

        let mut buf = BytesMut::new();
        ServerMessage::RosterSnapshot(snapshot_with(MAX_SNAPSHOT_PLAYERS + 1)).encode(&mut buf);
        match ServerMessage::decode(&buf).unwrap() {
            ServerMessage::RosterSnapshot(decoded) => {
                assert_eq!(decoded.players.len(), MAX_SNAPSHOT_PLAYERS);
                assert_eq!(decoded, full);
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
    }
}
