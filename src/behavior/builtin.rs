//! Built-in demo behaviors

use std::path::PathBuf;
use std::sync::Arc;

use super::registry::BehaviorRegistry;
use super::{BehaviorContext, ShutdownBehavior};
use crate::Result;
use crate::audio::AudioSource;
use crate::device::ToneSpec;
use crate::intent::{Entity, NUMBER_ENTITY};

/// Spoken when no behavior matches the intent
pub const DEFAULT_REPLY: &str = "Sorry Dave, I can't do that";

/// Spoken when nothing was recognized
pub const ERROR_REPLY: &str = "Huh?";

/// Utterance prefix that powers the robot down
pub const SHUTDOWN_PREFIX: &str = "shut down";

/// Drive time when the utterance names no number
pub const DEFAULT_DRIVE_SECS: u32 = 5;

/// Longest drive a single command may request
pub const MAX_DRIVE_SECS: u32 = 30;

/// Song played by the `Song` intent
pub const SONG_PATH: &str = "./audio/song.wav";

/// Tunes alternated by the `Melody` intent
pub const MELODIES: [&str; 2] = ["C4Q,E4Q,G4Q,C5H;120", "G4E,F4E,E4E,D4E,C4H;140"];

const REPLIES: &[(&str, &str)] = &[
    ("Greeting", "Hello friend!"),
    ("Greeting.HowAreYou", "Hi, I'm doing great!"),
    ("Name", "My name is Chat Bot."),
    (
        "Laws",
        "A robot may not injure a human being, or, through inaction, allow a human being to come to harm.",
    ),
    ("Birthday", "I was born November 7th, 1985 in Katsushika Tokyo."),
    (
        "Joke",
        "Why was the robot angry? Because someone kept pushing his buttons!",
    ),
];

/// Seconds to drive for, from the first number entity
#[must_use]
pub fn drive_seconds(entities: &[Entity]) -> u32 {
    entities
        .iter()
        .find(|e| e.entity_type == NUMBER_ENTITY)
        .and_then(Entity::number)
        .filter(|n| n.is_finite() && *n >= 1.0)
        .map_or(DEFAULT_DRIVE_SECS, |n| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let secs = n.round().min(f64::from(MAX_DRIVE_SECS)) as u32;
            secs
        })
}

async fn drive(ctx: BehaviorContext, entities: Vec<Entity>) -> Result<()> {
    ctx.speak("Ok, let's go!").await?;
    ctx.drive(drive_seconds(&entities)).await
}

async fn song(ctx: BehaviorContext, _entities: Vec<Entity>) -> Result<()> {
    ctx.speak("I'd love to sing you a song!").await?;
    ctx.play(AudioSource::WavFile(PathBuf::from(SONG_PATH))).await
}

async fn melody(ctx: BehaviorContext, spec: &'static str) -> Result<()> {
    let tone: ToneSpec = spec.parse()?;
    ctx.play_tone(&tone).await
}

async fn eyes(ctx: BehaviorContext, _entities: Vec<Entity>) -> Result<()> {
    ctx.eyes_spin(3, 5).await?;
    ctx.speak("Wheee!").await
}

/// Register the demo replies, custom handlers and shutdown phrase
pub fn register_builtin(registry: &mut BehaviorRegistry) {
    registry.add_default_reply(DEFAULT_REPLY);
    registry.add_error_reply(ERROR_REPLY);

    for (token, reply) in REPLIES {
        registry.add_reply(*token, *reply);
    }

    registry.add_custom("Drive", drive);
    registry.add_custom("Song", song);
    for spec in MELODIES {
        registry.add_custom("Melody", move |ctx, _| melody(ctx, spec));
    }
    registry.add_custom("Eyes", eyes);

    registry.register_shutdown(
        SHUTDOWN_PREFIX,
        Arc::new(ShutdownBehavior::with_farewell("Goodbye!")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn melodies_are_valid() {
        for spec in MELODIES {
            assert!(spec.parse::<ToneSpec>().is_ok(), "{spec}");
        }
    }

    #[test]
    fn drive_seconds_from_entities() {
        assert_eq!(drive_seconds(&[]), DEFAULT_DRIVE_SECS);

        let three = Entity::new(NUMBER_ENTITY, "three", Some("3".to_string()));
        let unit = Entity::new("Unit", "seconds", None);
        assert_eq!(drive_seconds(&[unit.clone(), three]), 3);

        let huge = Entity::new(NUMBER_ENTITY, "1000", None);
        assert_eq!(drive_seconds(&[huge]), MAX_DRIVE_SECS);

        let zero = Entity::new(NUMBER_ENTITY, "0", None);
        assert_eq!(drive_seconds(&[zero, unit]), DEFAULT_DRIVE_SECS);
    }

    #[test]
    fn registers_demo_set() {
        let mut registry = BehaviorRegistry::new();
        register_builtin(&mut registry);

        assert_eq!(registry.group("Melody").unwrap().len(), 2);
        assert_eq!(registry.group("Greeting").unwrap().len(), 1);
        assert!(registry.group("Drive").is_some());
        assert!(registry.default_behavior().is_some());
        assert!(registry.error_behavior().is_some());
        assert!(registry.shutdown_for("Shut down").is_some());
    }
}
