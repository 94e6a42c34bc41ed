//! Shared test utilities

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use atc_fleet::config::file::AtcConfigFile;
use atc_fleet::config::Timing;
use atc_fleet::{
    AudioClip, ChannelRef, Config, Connection, Connector, Error, FleetEvent, MembershipChange,
    Participant, Result, SpeechProvider, Worker,
};

pub const GUILD: u64 = 10;
pub const LOBBY: ChannelRef = ChannelRef::new(GUILD, 100);
pub const LOUNGE: ChannelRef = ChannelRef::new(GUILD, 200);

/// Scripted voice connection that records what it was asked to do
pub struct FakeConnection {
    channel: Mutex<Option<ChannelRef>>,
    members: Mutex<HashMap<ChannelRef, Vec<Participant>>>,
    busy_polls: AtomicUsize,
    refusals: AtomicUsize,
    fail_connect: AtomicBool,
    invalid_text: Mutex<HashSet<u64>>,
    plays: Mutex<Vec<String>>,
    texts: Mutex<Vec<(u64, String)>>,
    connects: AtomicUsize,
    closed: watch::Sender<bool>,
}

impl FakeConnection {
    /// Not in any voice channel
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channel: Mutex::new(None),
            members: Mutex::new(HashMap::new()),
            busy_polls: AtomicUsize::new(0),
            refusals: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            invalid_text: Mutex::new(HashSet::new()),
            plays: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            closed: watch::channel(false).0,
        })
    }

    /// Already connected to `channel`
    pub fn in_channel(channel: ChannelRef) -> Arc<Self> {
        let connection = Self::new();
        *connection.channel.lock().unwrap() = Some(channel);
        connection
    }

    /// Replace the members of `channel`
    pub fn set_members(&self, channel: ChannelRef, humans: &[u64], bots: &[u64]) {
        let participants = humans
            .iter()
            .map(|&user_id| Participant {
                user_id,
                is_automated: false,
            })
            .chain(bots.iter().map(|&user_id| Participant {
                user_id,
                is_automated: true,
            }))
            .collect();
        self.members.lock().unwrap().insert(channel, participants);
    }

    /// Report audio as playing for the next `n` polls
    pub fn set_busy_polls(&self, n: usize) {
        self.busy_polls.store(n, Ordering::SeqCst);
    }

    /// Refuse the next `n` play requests with [`Error::PlaybackBusy`]
    pub fn set_refusals(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }

    pub fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn reject_text_channel(&self, channel_id: u64) {
        self.invalid_text.lock().unwrap().insert(channel_id);
    }

    /// Texts of every clip played, in order
    pub fn plays(&self) -> Vec<String> {
        self.plays.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<(u64, String)> {
        self.texts.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn connected_channel(&self) -> Option<ChannelRef> {
        *self.channel.lock().unwrap()
    }

    fn members(&self, channel: ChannelRef) -> Vec<Participant> {
        self.members
            .lock()
            .unwrap()
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    async fn connect(&self, channel: ChannelRef) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Connection("refused".to_string()));
        }
        *self.channel.lock().unwrap() = Some(channel);
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        self.busy_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn play(&self, clip: &AudioClip) -> Result<()> {
        if self.is_closed() || self.connected_channel().is_none() {
            return Err(Error::NotConnected);
        }
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::PlaybackBusy);
        }
        self.plays
            .lock()
            .unwrap()
            .push(clip.path().display().to_string());
        Ok(())
    }

    async fn send_text(&self, channel_id: u64, text: &str) -> Result<()> {
        if self.invalid_text.lock().unwrap().contains(&channel_id) {
            return Err(Error::InvalidTextChannel(format!(
                "no text channel with id {channel_id}"
            )));
        }
        self.texts
            .lock()
            .unwrap()
            .push((channel_id, text.to_string()));
        Ok(())
    }

    async fn close(&self) {
        *self.channel.lock().unwrap() = None;
        self.closed.send_replace(true);
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|c| *c).await;
    }
}

/// Speech provider whose clips are named after their text
#[derive(Default)]
pub struct FakeSpeech {
    temp_dir: PathBuf,
    spoken: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeSpeech {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make synthesis of `text` fail
    pub fn fail_on(&self, text: &str) {
        self.failing.lock().unwrap().insert(text.to_string());
    }

    /// Every text synthesized, in order
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechProvider for FakeSpeech {
    fn name(&self) -> &str {
        "fake"
    }

    fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    async fn render(&self, _text: &str, _output: &Path) -> Result<()> {
        Ok(())
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        self.spoken.lock().unwrap().push(text.to_string());
        if self.failing.lock().unwrap().contains(text) {
            return Err(Error::Speech(format!("cannot say {text}")));
        }
        Ok(AudioClip::new(text))
    }
}

/// Speech provider that renders each text into a real file under `dir`
pub struct DiskSpeech {
    dir: PathBuf,
    rendered: Mutex<Vec<String>>,
}

impl DiskSpeech {
    pub fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            rendered: Mutex::new(Vec::new()),
        })
    }

    /// Every text rendered, in order
    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }

    /// Files currently in the clip directory
    pub fn files(&self) -> usize {
        std::fs::read_dir(&self.dir).map_or(0, Iterator::count)
    }
}

#[async_trait]
impl SpeechProvider for DiskSpeech {
    fn name(&self) -> &str {
        "disk"
    }

    fn temp_dir(&self) -> &Path {
        &self.dir
    }

    async fn render(&self, text: &str, output: &Path) -> Result<()> {
        self.rendered.lock().unwrap().push(text.to_string());
        tokio::fs::write(output, text).await?;
        Ok(())
    }
}

/// Opens a fresh [`FakeConnection`] per call and keeps the event senders
#[derive(Default)]
pub struct FakeConnector {
    opened: Mutex<Vec<(String, Arc<FakeConnection>)>>,
    senders: Mutex<Vec<mpsc::Sender<FleetEvent>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every connection opened, with the worker id it was opened for
    pub fn opened(&self) -> Vec<(String, Arc<FakeConnection>)> {
        self.opened.lock().unwrap().clone()
    }

    /// Latest connection opened for `worker`
    pub fn latest(&self, worker: &str) -> Option<Arc<FakeConnection>> {
        self.opened()
            .into_iter()
            .rev()
            .find(|(id, _)| id == worker)
            .map(|(_, connection)| connection)
    }

    /// Push an event into the fleet as a connection would
    pub async fn emit(&self, event: FleetEvent) {
        let sender = self.senders.lock().unwrap().first().cloned();
        sender
            .expect("no connection opened")
            .send(event)
            .await
            .expect("fleet stopped listening");
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(
        &self,
        worker: &str,
        _token: &str,
        events: mpsc::Sender<FleetEvent>,
    ) -> Result<Arc<dyn Connection>> {
        let connection = FakeConnection::new();
        self.opened
            .lock()
            .unwrap()
            .push((worker.to_string(), Arc::clone(&connection)));
        self.senders.lock().unwrap().push(events);
        Ok(connection)
    }
}

/// Configuration with `tokens` workers, stored under `dir`
pub fn test_config(dir: &Path, tokens: usize, admin_ids: &[u64]) -> Config {
    let file = AtcConfigFile {
        tokens: (0..tokens).map(|i| format!("token-{i}")).collect(),
        admin_ids: admin_ids.to_vec(),
        ..AtcConfigFile::default()
    };
    let mut config = Config::from_file(dir.join("config.toml"), file);
    config.speech.temp_dir = dir.join("temp");
    config
}

/// Worker with default timing around `connection`
pub fn test_worker(
    id: &str,
    priority: i64,
    connection: &Arc<FakeConnection>,
    speech: &Arc<FakeSpeech>,
) -> Arc<Worker> {
    Arc::new(Worker::new(
        id,
        priority,
        Arc::clone(connection) as Arc<dyn Connection>,
        Arc::clone(speech) as Arc<dyn SpeechProvider>,
        Timing::default(),
    ))
}

/// Worker with millisecond delays, for tests that touch the filesystem
pub fn quick_worker(
    connection: &Arc<FakeConnection>,
    speech: Arc<dyn SpeechProvider>,
) -> Arc<Worker> {
    let timing = Timing {
        debounce: Duration::from_millis(10),
        poll: Duration::from_millis(5),
        retry: Duration::from_millis(5),
        ..Timing::default()
    };
    Arc::new(Worker::new(
        "quick",
        0,
        Arc::clone(connection) as Arc<dyn Connection>,
        speech,
        timing,
    ))
}

/// Wait up to a few seconds for `done`
pub async fn eventually(mut done: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached in time");
}

/// Member with `member_id` moving from `before` to `after`
pub fn change(
    member_id: u64,
    name: &str,
    before: Option<ChannelRef>,
    after: Option<ChannelRef>,
) -> MembershipChange {
    MembershipChange {
        member_id,
        display_name: name.to_string(),
        before,
        after,
        is_self: false,
        is_automated: false,
    }
}

pub fn joined(member_id: u64, name: &str, channel: ChannelRef) -> MembershipChange {
    change(member_id, name, None, Some(channel))
}

pub fn left(member_id: u64, name: &str, channel: ChannelRef) -> MembershipChange {
    change(member_id, name, Some(channel), None)
}
