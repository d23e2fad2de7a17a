//! Audio surface
//!
//! The simulation only fires sound requests; mixing and playback belong to
//! whatever implements `AudioSink` on the platform side.

/// Sound effect and music identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundId {
    /// Player fires
    Shoot,
    /// Enemy fires
    EnemyShoot,
    /// Something took damage (start of a damage streak)
    Hit,
    /// Small enemy destroyed
    Explode,
    /// Boss segment destroyed
    SegmentExplode,
    /// Boss destroyed
    BossExplode,
    /// Boss arrives
    BossWarning,
    /// Player loses a life
    PlayerHit,
    /// Powerup collected
    PickupCollect,
    /// Destructible sector burns
    SectorCollapse,
    /// Wave spawn began
    WaveStart,
    /// Level cleared fanfare
    LevelClear,
    /// Run ended
    GameOver,
    /// Background track for a theme
    Music(u8),
}

/// Output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Sfx,
    Music,
}

impl SoundId {
    pub fn channel(&self) -> Channel {
        match self {
            SoundId::Music(_) => Channel::Music,
            _ => Channel::Sfx,
        }
    }
}

/// Playback flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayFlags {
    pub looped: bool,
    /// Drop the request if the same sound is already playing
    pub exclusive: bool,
}

impl PlayFlags {
    pub const ONCE: Self = Self {
        looped: false,
        exclusive: false,
    };
    pub const LOOP: Self = Self {
        looped: true,
        exclusive: true,
    };
}

/// Fire-and-forget audio output
pub trait AudioSink {
    fn play(&mut self, sound: SoundId, flags: PlayFlags);
    fn stop(&mut self, channel: Channel);
}

/// Discards everything (headless runs)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn play(&mut self, _sound: SoundId, _flags: PlayFlags) {}
    fn stop(&mut self, _channel: Channel) {}
}

/// Audio request recorded by `AudioLog`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCall {
    Play(SoundId, PlayFlags),
    Stop(Channel),
}

/// Records every request, with master mute like a real mixer
#[derive(Debug, Default, Clone)]
pub struct AudioLog {
    pub calls: Vec<AudioCall>,
    pub muted: bool,
}

impl AudioLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `sound` was requested
    pub fn count(&self, sound: SoundId) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, AudioCall::Play(s, _) if *s == sound))
            .count()
    }
}

impl AudioSink for AudioLog {
    fn play(&mut self, sound: SoundId, flags: PlayFlags) {
        if !self.muted {
            self.calls.push(AudioCall::Play(sound, flags));
        }
    }

    fn stop(&mut self, channel: Channel) {
        self.calls.push(AudioCall::Stop(channel));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_log_counts() {
        let mut log = AudioLog::new();
        log.play(SoundId::Hit, PlayFlags::ONCE);
        log.play(SoundId::Hit, PlayFlags::ONCE);
        log.play(SoundId::Music(2), PlayFlags::LOOP);
        log.stop(Channel::Music);
        assert_eq!(log.count(SoundId::Hit), 2);
        assert_eq!(log.count(SoundId::Music(2)), 1);
        assert_eq!(log.calls.len(), 4);
    }

    #[test]
    fn test_muted_log_drops_plays() {
        let mut log = AudioLog {
            muted: true,
            ..Default::default()
        };
        log.play(SoundId::Explode, PlayFlags::ONCE);
        assert_eq!(log.count(SoundId::Explode), 0);
    }

    #[test]
    fn test_music_channel() {
        assert_eq!(SoundId::Music(0).channel(), Channel::Music);
        assert_eq!(SoundId::Shoot.channel(), Channel::Sfx);
    }
}
