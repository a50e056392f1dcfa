use std::path::PathBuf;

use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::level_filters;

use quiz_configurator::{
    app::QuizApp,
    pack::Difficulty,
    scheduler::{TimerKind, TokioScheduler},
    session::{QuizSession, RevealState, SessionPhase},
    storage::{JsonStorage, PackStorage},
    trivia::OpenTriviaClient,
    AppResult,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> AppResult {
    dotenv().ok();
    let rust_log = std::env::var("LOG_LEVEL").unwrap_or("warn".into());
    tracing_subscriber::fmt()
        .with_max_level(level_filters::LevelFilter::from_level(
            rust_log.parse().unwrap_or(tracing::Level::WARN),
        ))
        .with_target(false)
        .init();

    let data_dir = std::env::var("QUIZ_DATA_DIR").ok().map(PathBuf::from);
    let storage = JsonStorage::new(data_dir, None);
    let mut app = QuizApp::load(storage).await;
    app.persist().await;

    if let Ok(category) = std::env::var("QUIZ_IMPORT_CATEGORY") {
        import_trivia(&mut app, &category).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Question packs:");
    for (i, pack) in app.packs().iter().enumerate() {
        println!("  {}. {}", i + 1, pack.name());
    }
    println!("Pick a pack to play (enter for 1):");
    if let Some(line) = lines.next_line().await? {
        if let Ok(n) = line.trim().parse::<usize>() {
            if n >= 1 && !app.select_pack(n - 1) {
                log::warn!("No pack #{n}, staying on the first one");
            }
        }
    }

    let (scheduler, mut timer_rx) = TokioScheduler::new();
    let mut session = QuizSession::new(scheduler);
    session.start(app.active_pack().map(|p| p.pack()));
    if session.phase() == SessionPhase::Idle {
        println!("{}", session.status());
        return Ok(());
    }
    print_question(&session);

    loop {
        tokio::select! {
            event = timer_rx.recv() => {
                let Some(event) = event else { break };
                if !session.scheduler().is_live(&event) {
                    continue;
                }
                match event.kind {
                    TimerKind::Repeating => {
                        session.tick();
                        match session.phase() {
                            SessionPhase::QuestionActive => {
                                println!("  {}s left", session.time_remaining());
                            }
                            SessionPhase::AnswerRevealed => print_reveal(&session),
                            _ => {}
                        }
                    }
                    TimerKind::Once => {
                        session.advance();
                        if session.is_finished() {
                            println!();
                            println!("{}", session.status());
                            break;
                        }
                        print_question(&session);
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = line.trim();
                if input.eq_ignore_ascii_case("q") {
                    session.stop();
                    break;
                }
                let before = session.phase();
                if let Ok(n) = input.parse::<usize>() {
                    if n >= 1 {
                        session.select(n - 1);
                    }
                }
                if before == SessionPhase::QuestionActive
                    && session.phase() == SessionPhase::AnswerRevealed
                {
                    print_reveal(&session);
                }
            }
        }
    }

    app.process_changes().await;
    Ok(())
}

async fn import_trivia<S: PackStorage>(app: &mut QuizApp<S>, category: &str) {
    let Ok(category) = category.parse::<u32>() else {
        log::warn!("QUIZ_IMPORT_CATEGORY is not a category id");
        return;
    };
    let amount = std::env::var("QUIZ_IMPORT_AMOUNT")
        .ok()
        .and_then(|a| a.parse().ok())
        .unwrap_or(10);
    let difficulty = std::env::var("QUIZ_IMPORT_DIFFICULTY")
        .ok()
        .and_then(|d| parse_difficulty(&d));

    let client = OpenTriviaClient::new();
    match client.import_questions(amount, category, difficulty).await {
        Ok(questions) => {
            let added = app.import_into_active(questions);
            let name = app
                .active_pack()
                .map(|p| p.name().to_owned())
                .unwrap_or_default();
            println!("Imported {added} questions into '{name}'.");
            app.process_changes().await;
        }
        Err(e) => println!("{e}"),
    }
}

fn print_question(session: &QuizSession<TokioScheduler>) {
    println!();
    println!(
        "{}: {}",
        session.progress_text(),
        session.current_question_text()
    );
    for (i, answer) in session.answers().iter().enumerate() {
        println!("  {}. {}", i + 1, answer.text());
    }
    println!("Answer within {}s (q to quit):", session.time_remaining());
}

fn print_reveal(session: &QuizSession<TokioScheduler>) {
    for answer in session.answers() {
        match answer.reveal() {
            RevealState::Correct => println!("  + {}", answer.text()),
            RevealState::Incorrect => println!("  - {}", answer.text()),
            RevealState::Default => {}
        }
    }
    println!("{}", session.status());
}

fn parse_difficulty(value: &str) -> Option<Difficulty> {
    match value.to_ascii_lowercase().as_str() {
        "easy" => Some(Difficulty::Easy),
        "medium" => Some(Difficulty::Medium),
        "hard" => Some(Difficulty::Hard),
        _ => None,
    }
}
