//! Interactive terminal chat.
//!
//! A thin consumer of the core API: it keeps the rendered history, feeds
//! the streaming generator one turn at a time and optionally speaks the
//! replies. Turn serialization falls out of the read-eval loop: input is
//! not accepted while a reply is streaming.

use crate::audio_toolkit::pcm;
use crate::fallback::SystemSpeech;
use crate::gemini::GeminiClient;
use crate::playback::{self, PlaybackScheduler};
use crate::session::{Message, Role, SessionStore};
use crate::settings::AppSettings;
use crate::speech::{Speaker, SpeechSynthesizer, SpeechTransport};
use crate::streaming::ResponseGenerator;
use clap::Parser;
use log::warn;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_SYSTEM_PROMPT: &str = "You are Zemenai, a helpful assistant for Amharic speakers. \
     Answer in Amharic unless the user writes in another language, and keep \
     your answers clear and concise.";

const CLI_SESSION_ID: &str = "terminal";

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "zemenai", about = "Zemenai - Amharic chat assistant")]
pub struct CliArgs {
    /// Speak assistant replies aloud
    #[arg(long)]
    pub speak: bool,

    /// Override the default system prompt
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Write the synthesized reply to a WAV file instead of playing it
    #[arg(long)]
    pub dump_audio: Option<PathBuf>,

    /// Audio output device for playback
    #[arg(long)]
    pub output_device: Option<String>,

    /// List audio output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Enable debug mode with verbose logging
    #[arg(long)]
    pub debug: bool,
}

pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    if args.list_devices {
        for name in playback::list_output_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut settings = AppSettings::from_env();
    if args.output_device.is_some() {
        settings.selected_output_device = args.output_device.clone();
    }

    let client = Arc::new(GeminiClient::new(&settings));
    let generator = ResponseGenerator::new(client.clone(), SessionStore::new());
    let speaker = Speaker::new(
        SpeechSynthesizer::new(client.clone()),
        PlaybackScheduler::new(
            settings.selected_output_device.clone(),
            settings.playback_volume,
        ),
        Arc::new(SystemSpeech),
    );

    let system_prompt = args
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

    println!("Zemenai terminal chat. '/new' starts a fresh conversation, '/quit' exits.");

    let mut history: Vec<Message> = Vec::new();
    let mut next_id = 0usize;
    let stdin = io::stdin();

    loop {
        print!("you › ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let input = line.trim();

        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                generator.delete_conversation(CLI_SESSION_ID);
                history.clear();
                println!("Started a new conversation.");
                continue;
            }
            _ => {}
        }

        next_id += 1;
        history.push(Message::new(
            format!("msg-{}", next_id),
            Role::User,
            input,
        ));

        let mut stream = match generator.stream(CLI_SESSION_ID, &history, &system_prompt) {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("Error: {}", e);
                history.pop();
                continue;
            }
        };

        print!("zemenai › ");
        io::stdout().flush()?;

        let mut reply = String::new();
        let mut failed = false;
        while let Some(item) = stream.recv().await {
            match item {
                Ok(fragment) => {
                    print!("{}", fragment);
                    io::stdout().flush()?;
                    reply.push_str(&fragment);
                }
                Err(e) => {
                    eprintln!();
                    eprintln!("Error: {}", e);
                    failed = true;
                }
            }
        }
        println!();

        if failed {
            // The turn was not committed; drop the message locally so the
            // rendered history matches the session context.
            history.pop();
            continue;
        }

        next_id += 1;
        history.push(Message::new(
            format!("msg-{}", next_id),
            Role::Assistant,
            reply.clone(),
        ));

        if reply.is_empty() {
            continue;
        }

        if let Some(path) = &args.dump_audio {
            dump_reply_audio(client.as_ref(), path, &reply).await;
        } else if args.speak {
            speaker.speak(&reply).await;
        }
    }

    Ok(())
}

/// Synthesize `reply` and write it to `path` as a WAV file.
async fn dump_reply_audio(client: &GeminiClient, path: &PathBuf, reply: &str) {
    match client.synthesize_speech(reply).await {
        Ok(bytes) => match pcm::decode_to_samples(&bytes) {
            Ok(samples) => {
                if let Err(e) = pcm::save_wav_file(path, &samples) {
                    warn!("Failed to write {:?}: {}", path, e);
                } else {
                    println!("Wrote spoken reply to {:?}", path);
                }
            }
            Err(e) => warn!("Discarding malformed speech payload: {}", e),
        },
        Err(e) => warn!("Speech synthesis failed: {}", e),
    }
}
