/*
 *  lms.rs
 *
 *  LyMarq - the big squeeze
 *  (c) 2020-25 Stuart Hunter
 *
 *  Server discovery, player selection, the track snapshot poller and the
 *  fire-and-forget transport commands.
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use log::{debug, info, warn};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, UdpSocket};
use std::str;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::renderable::{decode_scaled, fingerprint_bytes};
use crate::rpc::RpcClient;
use crate::snapshot::{ImageSource, Snapshot};
use crate::stage::Stage;

/// Status tags: artist, album, artwork url, coverid, url.
const SLIM_TAGS: &str = "tags:alKcu";

/// A server found on the local network, or named explicitly in config.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub host: IpAddr,
    pub port: u16,
    pub name: String,
    pub vers: String,
    pub uuid: String,
}

/// Discovers a server on the local network using UDP broadcast and returns
/// the first one that answers within the timeout.
pub fn discover() -> Result<ServerInfo, Box<dyn std::error::Error>> {
    const LISTEN_ADDR: &str = "0.0.0.0:0";
    const BROADCAST_PORT: u16 = 3483;
    const TIMEOUT_MS: u64 = 5000;
    const POLL_INTERVAL_MS: u64 = 500;

    let socket = UdpSocket::bind(LISTEN_ADDR)?;
    let broadcast_addr = SocketAddrV4::new(Ipv4Addr::BROADCAST, BROADCAST_PORT);
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;

    let start_time = Instant::now();
    let timeout = Duration::from_millis(TIMEOUT_MS);
    let poll_pause = Duration::from_millis(POLL_INTERVAL_MS);
    let mut buffer = [0u8; 128];
    let payload = "eJSON\0IPAD\0NAME\0VERS\0UUID\0".as_bytes();

    debug!("Attempting to discover servers...");

    loop {
        if start_time.elapsed() >= timeout {
            return Err("server discovery timed-out".into());
        }
        if let Err(e) = socket.send_to(payload, broadcast_addr) {
            warn!("Failed to send discovery broadcast: {}", e);
            std::thread::sleep(poll_pause);
            continue;
        }
        match socket.recv_from(&mut buffer) {
            Ok((num_bytes, src_addr)) => {
                debug!("Received {} bytes from {}", num_bytes, src_addr);
                let info = parse_discovery_reply(&buffer[..num_bytes], src_addr.ip())
                    .ok_or("malformed discovery reply")?;

                info!("Server ............: {}:{}", info.host, info.port);
                info!("Server name .......: {}", info.name);
                info!("Server version ....: {}", info.vers);
                info!("Server UUID .......: {}", info.uuid);
                return Ok(info);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(poll_pause);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// The reply is a tag stream: 'E', then 4-byte key + length byte + value.
fn parse_discovery_reply(buffer: &[u8], host: IpAddr) -> Option<ServerInfo> {
    let mut info = ServerInfo {
        host,
        port: 9000,
        name: String::new(),
        vers: String::new(),
        uuid: String::new(),
    };

    let mut start = 5; // skip 'E' + "JSON" key
    let mut stop = 1 + start + *buffer.get(start)? as usize;
    let port_str = str::from_utf8(buffer.get(1 + start..stop)?).ok()?;
    info.port = port_str
        .trim_matches(|c: char| !c.is_ascii_digit())
        .parse::<u16>()
        .ok()?;

    for _ in 0..3 {
        start = stop;
        let key = str::from_utf8(buffer.get(start..start + 4)?).ok()?;
        start += 4;
        stop = 1 + start + *buffer.get(start)? as usize;
        let value = str::from_utf8(buffer.get(1 + start..stop)?).ok()?;
        match key {
            "NAME" => info.name = value.to_string(),
            "VERS" => info.vers = value.to_string(),
            "UUID" => info.uuid = value.to_string(),
            _ => break,
        }
    }
    Some(info)
}

// The server is liberal with numeric types: indexes and flags arrive as
// numbers or strings depending on version. Accept both.
fn de_flexible_i32<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        N(i64),
        S(String),
    }
    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::N(n) => Ok(n as i32),
        NumOrStr::S(s) => Ok(s.trim().parse::<i32>().unwrap_or(0)),
    }
}

fn de_flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        N(i64),
        S(String),
        B(bool),
    }
    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::N(n)) => n != 0,
        Some(Flag::S(s)) => s != "0" && !s.is_empty(),
        Some(Flag::B(b)) => b,
        None => false,
    })
}

fn default_zero() -> i32 {
    0
}

#[derive(Debug, Clone, Deserialize)]
pub struct Player {
    #[serde(rename = "name")]
    pub player_name: String,
    #[serde(rename = "playerid")]
    pub player_id: String,
    #[serde(default, deserialize_with = "de_flexible_bool")]
    pub connected: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct PlayerStatus {
    pub mode: Option<String>,
    #[serde(
        default = "default_zero",
        deserialize_with = "de_flexible_i32",
        rename = "playlist_cur_index"
    )]
    pub playlist_cur_index: i32,
    pub playlist_loop: Option<Vec<Track>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Track {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub remotetitle: Option<String>,
    pub artwork_url: Option<String>,
    #[serde(default, deserialize_with = "de_flexible_bool")]
    pub remote: bool,
    #[serde(
        default = "default_zero",
        deserialize_with = "de_flexible_i32",
        rename = "playlist index"
    )]
    pub playlist_index: i32,
}

/// Display-ready reading of one status response.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub line1: String,
    pub line2: String,
    pub remote: bool,
    /// Absolute URL of the streaming service badge, when there is one.
    pub icon_url: Option<String>,
}

impl NowPlaying {
    /// Derive the two display lines from a status. `None` means the play
    /// queue is empty and the display should show the idle placeholder.
    pub fn from_status(status: &PlayerStatus, host: &str, port: u16) -> Option<Self> {
        let tracks = status.playlist_loop.as_ref()?;
        if tracks.is_empty() {
            return None;
        }
        let cur = status.playlist_cur_index;
        let track = tracks
            .iter()
            .find(|t| t.playlist_index == cur)
            .or_else(|| tracks.get(cur.max(0) as usize))
            .or_else(|| tracks.first())?;

        let line1 = track
            .title
            .clone()
            .or_else(|| track.remotetitle.clone())
            .unwrap_or_default();

        let mut parts: Vec<&str> = Vec::new();
        if let Some(artist) = track.artist.as_deref() {
            if !artist.is_empty() {
                parts.push(artist);
            }
        }
        if let Some(album) = track.album.as_deref() {
            if !album.is_empty() {
                parts.push(album);
            }
        }
        let line2 = parts.join(" - ");

        let icon_url = if track.remote {
            track.artwork_url.as_ref().map(|url| {
                if url.starts_with("http://") || url.starts_with("https://") {
                    url.clone()
                } else {
                    format!("http://{}:{}/{}", host, port, url.trim_start_matches('/'))
                }
            })
        } else {
            None
        };

        Some(NowPlaying {
            line1,
            line2,
            remote: track.remote,
            icon_url,
        })
    }
}

/// Fetch the player list and pick one by name, or the first connected
/// player when the filter is "-".
pub async fn pick_player(
    rpc: &RpcClient,
    host: &str,
    port: u16,
    name_filter: &str,
) -> Result<Player, Box<dyn std::error::Error>> {
    let result = rpc
        .slim_request(host, port, "", "players", vec![json!("0"), json!("99")])
        .await?;

    let players: Vec<Player> = match result.get("players_loop") {
        Some(list) => serde_json::from_value(list.clone())?,
        None => Vec::new(),
    };
    if players.is_empty() {
        return Err("no players reported by server".into());
    }

    let chosen = players
        .iter()
        .find(|p| {
            name_filter == "-" && p.connected
                || p.player_name.eq_ignore_ascii_case(name_filter)
        })
        .or_else(|| players.first().filter(|_| name_filter == "-"))
        .cloned()
        .ok_or_else(|| format!("player '{}' not found", name_filter))?;

    info!("Player ............: {} ({})", chosen.player_name, chosen.player_id);
    Ok(chosen)
}

/// Everything a poll worker needs, shared by Arc across workers. The stage
/// lock lives in here; it outlives every spawned worker by construction.
pub struct PollCtx {
    pub rpc: RpcClient,
    pub host: String,
    pub port: u16,
    pub player_mac: String,
    pub stage: Arc<Mutex<Stage>>,
    pub art_height: u32,
    pub icon_size: u32,
}

impl PollCtx {
    fn cover_url(&self) -> String {
        format!(
            "http://{}:{}/music/current/cover.jpg?player={}",
            self.host, self.port, self.player_mac
        )
    }

    /// Fetch and decode one image field. Decode is skipped when the stage
    /// already shows these bytes; merge keys off the fingerprint alone.
    async fn fetch_image(
        &self,
        url: &str,
        target_height: u32,
        shown_fingerprint: Option<u64>,
    ) -> Option<ImageSource> {
        match self.rpc.fetch_bytes(url).await {
            Ok(bytes) => {
                let fp = fingerprint_bytes(&bytes);
                let bitmap = if shown_fingerprint == Some(fp) {
                    None
                } else {
                    decode_scaled(&bytes, target_height)
                };
                Some(ImageSource { fingerprint: Some(fp), bitmap })
            }
            Err(e) => {
                debug!("image fetch failed for {}: {}", url, e);
                Some(ImageSource::unavailable())
            }
        }
    }
}

/// One complete poll cycle: status, art, icon, then a single merge. All
/// network and decode work happens before the stage lock is taken; the
/// lock is held only for the merge itself.
async fn poll_once(ctx: Arc<PollCtx>) {
    let result = ctx
        .rpc
        .slim_request(
            &ctx.host,
            ctx.port,
            &ctx.player_mac,
            "status",
            vec![json!("-"), json!(1), json!(SLIM_TAGS)],
        )
        .await;

    // A failed poll never replaces what is on screen; log and wait for the
    // next cycle.
    let value = match result {
        Ok(v) => v,
        Err(e) => {
            debug!("status poll failed: {}", e);
            return;
        }
    };
    let status: PlayerStatus = match serde_json::from_value(value) {
        Ok(s) => s,
        Err(e) => {
            warn!("unparseable status response: {}", e);
            return;
        }
    };

    let snapshot = match NowPlaying::from_status(&status, &ctx.host, ctx.port) {
        None => Snapshot::idle(),
        Some(np) => {
            let (shown_art, shown_icon) = {
                let stage = ctx.stage.lock().unwrap();
                (stage.art_fingerprint(), stage.icon_fingerprint())
            };
            let art = ctx
                .fetch_image(&ctx.cover_url(), ctx.art_height, shown_art)
                .await;
            let icon = match &np.icon_url {
                Some(url) => ctx.fetch_image(url, ctx.icon_size, shown_icon).await,
                None => None,
            };
            Snapshot {
                line1: Some(np.line1),
                line2: Some(np.line2),
                art,
                icon,
            }
        }
    };

    ctx.stage.lock().unwrap().merge(snapshot);
}

/// The snapshot poller: a ticker that spawns one detached worker per
/// interval. Workers are not tracked or cancelled; if a fetch outlives the
/// interval, merges may apply in completion order rather than request
/// order. Accepted - the next on-time poll repairs any staleness.
pub struct Poller {
    stop_tx: Option<mpsc::Sender<()>>,
    #[allow(dead_code)]
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn spawn(ctx: PollCtx, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        let ctx = Arc::new(ctx);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tokio::spawn(poll_once(Arc::clone(&ctx)));
                    }
                    _ = stop_rx.recv() => {
                        debug!("poller received stop signal, exiting");
                        break;
                    }
                }
            }
        });

        Poller {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(sender) = self.stop_tx.take() {
            let _ = sender.try_send(());
        }
    }
}

/// Keys the window loop can send to the player. Plain fire-and-forget
/// commands; failures are logged and otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKey {
    TogglePause,
    NextTrack,
    PreviousTrack,
    VolumeUp,
    VolumeDown,
}

#[derive(Debug, Clone)]
pub struct Control {
    rpc: RpcClient,
    host: String,
    port: u16,
    player_mac: String,
}

impl Control {
    pub fn new(rpc: RpcClient, host: String, port: u16, player_mac: String) -> Self {
        Control { rpc, host, port, player_mac }
    }

    pub async fn send(&self, key: TransportKey) {
        let (command, params): (&str, Vec<Value>) = match key {
            TransportKey::TogglePause => ("pause", vec![]),
            TransportKey::NextTrack => ("playlist", vec![json!("index"), json!("+1")]),
            TransportKey::PreviousTrack => ("playlist", vec![json!("index"), json!("-1")]),
            TransportKey::VolumeUp => ("mixer", vec![json!("volume"), json!("+5")]),
            TransportKey::VolumeDown => ("mixer", vec![json!("volume"), json!("-5")]),
        };
        if let Err(e) = self
            .rpc
            .slim_request(&self.host, self.port, &self.player_mac, command, params)
            .await
        {
            warn!("transport command '{}' failed: {}", command, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_from(value: Value) -> PlayerStatus {
        serde_json::from_value(value).expect("status json")
    }

    #[test]
    fn test_now_playing_from_local_track() {
        let status = status_from(json!({
            "mode": "play",
            "playlist_cur_index": "1",
            "playlist_loop": [
                {"playlist index": 0, "title": "Other", "artist": "A", "album": "B"},
                {"playlist index": 1, "title": "Song A", "artist": "Artist A", "album": "Album A"}
            ]
        }));
        let np = NowPlaying::from_status(&status, "10.0.0.2", 9000).unwrap();

        assert_eq!(np.line1, "Song A");
        assert_eq!(np.line2, "Artist A - Album A");
        assert!(!np.remote);
        assert!(np.icon_url.is_none());
    }

    #[test]
    fn test_now_playing_empty_queue() {
        let status = status_from(json!({ "mode": "stop" }));
        assert!(NowPlaying::from_status(&status, "10.0.0.2", 9000).is_none());

        let status = status_from(json!({ "mode": "stop", "playlist_loop": [] }));
        assert!(NowPlaying::from_status(&status, "10.0.0.2", 9000).is_none());
    }

    #[test]
    fn test_remote_icon_url_resolution() {
        let status = status_from(json!({
            "mode": "play",
            "playlist_cur_index": 0,
            "playlist_loop": [
                {"playlist index": 0, "title": "Stream", "remote": 1,
                 "artwork_url": "imageproxy/radio/icon.png"}
            ]
        }));
        let np = NowPlaying::from_status(&status, "10.0.0.2", 9000).unwrap();
        assert_eq!(
            np.icon_url.as_deref(),
            Some("http://10.0.0.2:9000/imageproxy/radio/icon.png")
        );

        let status = status_from(json!({
            "mode": "play",
            "playlist_cur_index": 0,
            "playlist_loop": [
                {"playlist index": 0, "title": "Stream", "remote": "1",
                 "artwork_url": "https://cdn.example.com/icon.png"}
            ]
        }));
        let np = NowPlaying::from_status(&status, "10.0.0.2", 9000).unwrap();
        assert_eq!(np.icon_url.as_deref(), Some("https://cdn.example.com/icon.png"));
    }

    #[test]
    fn test_missing_fields_degrade_to_empty_line2() {
        let status = status_from(json!({
            "mode": "play",
            "playlist_cur_index": 0,
            "playlist_loop": [ {"playlist index": 0, "remotetitle": "Radio Feed", "remote": 1} ]
        }));
        let np = NowPlaying::from_status(&status, "10.0.0.2", 9000).unwrap();
        assert_eq!(np.line1, "Radio Feed");
        assert_eq!(np.line2, "");
    }

    #[test]
    fn test_discovery_reply_parse() {
        // E + JSON<len>"9000" + NAME<len>"den" + VERS<len>"9.0.2" + UUID<len>"abc"
        let mut reply: Vec<u8> = Vec::new();
        reply.extend(b"EJSON");
        reply.push(4);
        reply.extend(b"9000");
        reply.extend(b"NAME");
        reply.push(3);
        reply.extend(b"den");
        reply.extend(b"VERS");
        reply.push(5);
        reply.extend(b"9.0.2");
        reply.extend(b"UUID");
        reply.push(3);
        reply.extend(b"abc");

        let info = parse_discovery_reply(&reply, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))).unwrap();
        assert_eq!(info.port, 9000);
        assert_eq!(info.name, "den");
        assert_eq!(info.vers, "9.0.2");
        assert_eq!(info.uuid, "abc");
    }
}
