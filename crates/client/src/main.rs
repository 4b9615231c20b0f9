use std::fmt::Write as _;

use anyhow::{anyhow, bail, Context};
use chess_core::board::{render_text, BoardStyle};
use chess_core::navigator::{DisplayMode, MoveRow, Navigator};
use chess_core::pgn::parse_pgn;
use chess_core::selection::Selection;
use client::auth::forms::{describe, LoginForm, RegisterForm};
use client::auth::{AuthClient, AuthContext, Session};
use client::clients::api::{ApiClient, NewSavedGame};
use client::clients::leaderboard::LeaderboardClient;
use client::clients::lichess::{LichessClient, DEFAULT_IMPORT};
use client::clients::HttpContext;
use client::config::Config;
use client::game::session::{Command, GameSession, Snapshot, Step};
use client::game::{EndResult, SessionEvent, SessionState};
use client::matchmaking::Matchmaker;
use client::mux::WsMux;
use client::profile::{describe_duration, past_matches, PastMatch, Profile};
use client::storage::{self, LocalStorage};
use client::ClientError;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage: xadrez <command> [args]

  login <email> <password>
  register <username> <email> <password>
  confirm <code>
  logout
  dashboard                    match history
  queue                        search a match and play it
  play <room_id>               join or watch a room
  games                        saved-game library
  view <saved_id>
  view-game <game_id>          replay a finished match
  save <name> <pgn-file>
  edit <saved_id> <name> [pgn-file]
  delete <saved_id>
  import-lichess <username> [max]
  leaderboard
  profile <user_id>
  settings [background] [piece]";

const GAME_HELP: &str = "\
moves in SAN (e4, Nf3, O-O), `click <square>`, `<` `>` `<<` `>>` `go <n>`,
`flip`, `resign`, `ok` to close the result, `quit` to leave";

const VIEW_HELP: &str = "`<` `>` `<<` `>>` `go <n>`, `flip`, `quit`";

struct App {
    config: Config,
    http: HttpContext,
    auth: AuthContext,
}

impl App {
    fn new(config: Config) -> anyhow::Result<Self> {
        let storage = LocalStorage::open(&config.state_file)
            .with_context(|| format!("Failed to open {}", config.state_file.display()))?;
        let http = HttpContext::new(&config)?;
        if let Some(cookie) = storage.get(storage::SESSION_COOKIE) {
            http.restore_session_cookie(cookie);
        }
        Ok(Self {
            config,
            http,
            auth: AuthContext::new(storage),
        })
    }

    fn auth_client(&self) -> AuthClient {
        AuthClient::new(self.http.clone(), self.config.clone())
    }

    fn api(&self) -> ApiClient {
        let csrf = self.auth.session().map(|s| s.csrf_token);
        ApiClient::new(self.http.clone(), self.config.clone(), csrf)
    }

    /// The stored session, checked against the auth service.
    async fn session(&mut self) -> Result<Session, ClientError> {
        let client = self.auth_client();
        self.auth.ensure_valid(&client).await
    }

    fn board_style(&self) -> BoardStyle {
        let mut style = BoardStyle::default();
        if let Some(background) = self.auth.storage().get(storage::BACKGROUND) {
            style.background = background.to_string();
        }
        if let Some(piece) = self.auth.storage().get(storage::PIECE) {
            style.piece_theme = piece.to_string();
        }
        style
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        println!("{USAGE}");
        return Ok(());
    };

    let mut app = App::new(Config::from_env())?;
    let result = run(&mut app, command, rest).await;

    if let Err(e) = &result {
        if let Some(ClientError::Unauthorized) = e.downcast_ref::<ClientError>() {
            app.auth.forget()?;
            bail!("Not logged in or session expired. Run `xadrez login <email> <password>`.");
        }
    }
    result
}

async fn run(app: &mut App, command: &str, rest: &[String]) -> anyhow::Result<()> {
    match command {
        "login" => login(app, arg(rest, 0, "email")?, arg(rest, 1, "password")?).await,
        "register" => {
            register(
                app,
                arg(rest, 0, "username")?,
                arg(rest, 1, "email")?,
                arg(rest, 2, "password")?,
            )
            .await
        }
        "confirm" => confirm(app, arg(rest, 0, "code")?).await,
        "logout" => {
            let client = app.auth_client();
            app.auth.logout(&client).await?;
            println!("Logged out");
            Ok(())
        }
        "dashboard" => dashboard(app).await,
        "queue" => queue(app).await,
        "play" => {
            let session = app.session().await?;
            play(&app.config, &session, arg(rest, 0, "room_id")?).await
        }
        "games" => list_saved(app).await,
        "view" => view_saved(app, arg(rest, 0, "saved_id")?).await,
        "view-game" => view_game(app, arg(rest, 0, "game_id")?).await,
        "save" => save(app, arg(rest, 0, "name")?, arg(rest, 1, "pgn-file")?).await,
        "edit" => {
            let path = rest.get(2).map(String::as_str);
            edit_saved(app, arg(rest, 0, "saved_id")?, arg(rest, 1, "name")?, path).await
        }
        "delete" => {
            app.session().await?;
            let remaining = app.api().delete_saved_game(arg(rest, 0, "saved_id")?).await?;
            println!("Deleted. {} saved games left.", remaining.len());
            Ok(())
        }
        "import-lichess" => {
            let max = match rest.get(1) {
                Some(n) => n.parse().with_context(|| format!("Invalid game count: {n}"))?,
                None => DEFAULT_IMPORT,
            };
            import_lichess(app, arg(rest, 0, "username")?, max).await
        }
        "leaderboard" => leaderboard(app).await,
        "profile" => profile(app, arg(rest, 0, "user_id")?).await,
        "settings" => settings(app, rest.first(), rest.get(1)),
        "help" | "-h" | "--help" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("Unknown command `{other}`\n\n{USAGE}"),
    }
}

fn arg<'a>(rest: &'a [String], index: usize, name: &str) -> anyhow::Result<&'a str> {
    rest.get(index)
        .map(String::as_str)
        .with_context(|| format!("Missing <{name}>\n\n{USAGE}"))
}

/// Validation failures become one line per violated rule.
fn form_error(e: ClientError) -> anyhow::Error {
    match e {
        ClientError::Validation(errors) => anyhow!(describe(&errors).join("\n")),
        other => other.into(),
    }
}

async fn login(app: &mut App, email: &str, password: &str) -> anyhow::Result<()> {
    let client = app.auth_client();
    let session = app
        .auth
        .login(&client, &LoginForm::new(email, password))
        .await
        .map_err(form_error)?;
    println!("Welcome back, {}", session.username);
    Ok(())
}

async fn register(app: &mut App, username: &str, email: &str, password: &str) -> anyhow::Result<()> {
    let client = app.auth_client();
    let form = RegisterForm::new(username, email, password);
    app.auth.register(&client, &form).await.map_err(form_error)?;
    println!("Check {email} for a confirmation code, then run `xadrez confirm <code>`.");
    Ok(())
}

async fn confirm(app: &mut App, code: &str) -> anyhow::Result<()> {
    if app.auth.pending_verification().is_none() {
        bail!("No registration is pending. Run `xadrez register` first.");
    }
    let client = app.auth_client();
    let session = app.auth.confirm(&client, code).await.map_err(form_error)?;
    println!("Account confirmed. Welcome, {}", session.username);
    Ok(())
}

async fn dashboard(app: &mut App) -> anyhow::Result<()> {
    let session = app.session().await?;
    let games = app.api().games_of(&session.client_id).await?;
    println!("{}'s matches\n", session.username);
    print_matches(&past_matches(&games));
    println!("\nRun `xadrez queue` to search a match.");
    Ok(())
}

async fn queue(app: &mut App) -> anyhow::Result<()> {
    let session = app.session().await?;
    let mux = WsMux::connect(&app.config, &session.csrf_token).await?;
    let matchmaker = Matchmaker::new(mux.clone());
    let ticket = matchmaker.join_queue(&session.client_id)?;
    println!("Searching a match... (Ctrl-C to cancel)");

    let room_id = tokio::select! {
        room = ticket.match_found() => room?,
        _ = tokio::signal::ctrl_c() => {
            matchmaker.leave_queue();
            mux.close();
            println!("Search cancelled");
            return Ok(());
        }
    };

    let result = play(&app.config, &session, &room_id).await;
    mux.close();
    result
}

enum Input {
    Command(Command),
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let mut words = line.split_whitespace();
    let first = words.next()?;
    let input = match first {
        "quit" | "exit" | "q" => Input::Quit,
        "<" => Input::Command(Command::Navigate(Step::Prev)),
        ">" => Input::Command(Command::Navigate(Step::Next)),
        "<<" => Input::Command(Command::Navigate(Step::First)),
        ">>" => Input::Command(Command::Navigate(Step::Last)),
        "go" => Input::Command(Command::Navigate(Step::To(words.next()?.parse().ok()?))),
        "flip" => Input::Command(Command::Flip),
        "resign" => Input::Command(Command::Resign),
        "ok" => Input::Command(Command::DismissEnd),
        "click" => Input::Command(Command::Click(words.next()?.parse().ok()?)),
        san => Input::Command(Command::PlaySan(san.to_string())),
    };
    Some(input)
}

async fn play(config: &Config, session: &Session, room_id: &str) -> anyhow::Result<()> {
    let mut game = GameSession::connect(config, &session.csrf_token, room_id, &session.client_id).await?;
    let mut view = game.watch();
    let mut lines = stdin_lines();
    println!("{GAME_HELP}");

    loop {
        tokio::select! {
            event = game.next_event() => {
                let Some(event) = event else { break };
                if show_event(&event) {
                    print_snapshot(&view.borrow_and_update());
                }
                if matches!(event, SessionEvent::Disconnected { .. }) {
                    break;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(line.trim()) {
                    Some(Input::Quit) => break,
                    Some(Input::Command(command)) => {
                        let redraw = matches!(command, Command::Flip | Command::DismissEnd | Command::Click(_));
                        view.borrow_and_update();
                        game.send(command);
                        if redraw && view.changed().await.is_ok() {
                            print_snapshot(&view.borrow_and_update());
                        }
                    }
                    None => println!("{GAME_HELP}"),
                }
            }
        }
    }

    game.close().await;
    Ok(())
}

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

/// Print an event. Returns whether the board should be redrawn.
fn show_event(event: &SessionEvent) -> bool {
    if let Some(cue) = event.cue() {
        tracing::debug!(asset = cue.asset(), "Sound cue");
    }
    match event {
        SessionEvent::Welcomed { seat, players } => {
            let name = |s: &str| if s.is_empty() { "(waiting)".to_string() } else { s.to_string() };
            println!(
                "{} (white) vs {} (black), you are {}",
                name(&players.white_username),
                name(&players.black_username),
                match seat.color() {
                    Some(color) => format!("playing {}", color.fold_wb("white", "black")),
                    None => "watching".to_string(),
                }
            );
            true
        }
        SessionEvent::PageChanged(_) => true,
        SessionEvent::GameStarted => {
            println!("Game started");
            true
        }
        SessionEvent::GameEnded { result } => {
            let text = match result {
                EndResult::Won => "You won!".to_string(),
                EndResult::Lost => "You lost.".to_string(),
                EndResult::Draw => "Draw.".to_string(),
                EndResult::Watched(color) => format!("{} won.", color.fold_wb("White", "Black")),
                EndResult::Unknown => "Game over.".to_string(),
            };
            println!("{text} Type `ok` to keep browsing the moves.");
            true
        }
        SessionEvent::Quit { reason } => {
            println!("Room closed: {reason}");
            false
        }
        SessionEvent::Rejected { reason } => {
            println!("{reason}");
            false
        }
        SessionEvent::Disconnected { reason, .. } => {
            println!("Disconnected from the game server ({reason})");
            false
        }
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    let mut out = String::new();
    let _ = writeln!(out);
    out.push_str(&render_text(&snapshot.board, &snapshot.selection));
    let _ = writeln!(out, "{}", move_list(&snapshot.rows, snapshot.current_page));
    let status = match &snapshot.state {
        SessionState::Connecting => "connecting".to_string(),
        SessionState::Welcomed(_) => format!("{:?}", snapshot.status).to_lowercase(),
        SessionState::Ended { .. } => "ended".to_string(),
    };
    let _ = writeln!(out, "[{status}] {}", snapshot.board.fen);
    if snapshot.disconnected {
        let _ = writeln!(out, "(disconnected)");
    }
    print!("{out}");
}

/// Move list with the displayed page marked by `*`.
fn move_list(rows: &[MoveRow], current_page: usize) -> String {
    let mark = |page: usize, san: &str| {
        if page == current_page {
            format!("*{san}")
        } else {
            san.to_string()
        }
    };
    rows.iter()
        .map(|row| {
            let mut line = format!("{}. {}", row.number, mark(row.white.page, &row.white.san));
            if let Some(black) = &row.black {
                line.push(' ');
                line.push_str(&mark(black.page, &black.san));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("  ")
}

async fn list_saved(app: &mut App) -> anyhow::Result<()> {
    app.session().await?;
    let games = app.api().saved_games().await?;
    if games.is_empty() {
        println!("No saved games yet. Try `xadrez save` or `xadrez import-lichess`.");
        return Ok(());
    }
    for game in games {
        let date = game
            .created_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!("{:<26} {:<10} {}", game.game_id, date, game.name);
    }
    Ok(())
}

async fn view_saved(app: &mut App, saved_id: &str) -> anyhow::Result<()> {
    app.session().await?;
    let game = app.api().saved_game(saved_id).await?;
    let style = app.board_style();

    println!("{} ({} / {})", game.name, style.piece_theme, style.background);
    if let Some(record) = parse_pgn(&game.pgn) {
        let meta = &record.metadata;
        let date = meta.date.as_deref().unwrap_or("?");
        println!("{}  {}  {date}", meta.title(), meta.result);
    }
    review(&game.pgn).await
}

async fn view_game(app: &mut App, game_id: &str) -> anyhow::Result<()> {
    app.session().await?;
    let game = app.api().game(game_id).await?;
    let summary = PastMatch::from_game(&game);
    let result = if summary.is_draw() {
        "draw".to_string()
    } else {
        format!("{} won", summary.winner)
    };
    println!(
        "{} vs {}  {result}  {}  ({})",
        summary.white,
        summary.black,
        game.result_reason,
        describe_duration(summary.duration_secs)
    );
    review(&game.pgn).await
}

/// Step through `pgn` from stdin commands until `quit`.
async fn review(pgn: &str) -> anyhow::Result<()> {
    let mut navigator = Navigator::new(DisplayMode::Spectating, None);
    navigator.load_pgn(pgn)?;
    let selection = Selection::default();
    println!("{VIEW_HELP}");
    let mut lines = stdin_lines();
    loop {
        let board = navigator.board_state();
        println!();
        print!("{}", render_text(&board, &selection));
        println!("{}", move_list(&navigator.move_rows(), navigator.current_index()));

        let Some(line) = lines.next_line().await? else { break };
        match parse_input(line.trim()) {
            Some(Input::Quit) => break,
            Some(Input::Command(Command::Navigate(step))) => {
                let _ = match step {
                    Step::First => navigator.first(),
                    Step::Prev => navigator.prev(),
                    Step::Next => navigator.next(),
                    Step::Last => navigator.last(),
                    Step::To(index) => navigator.go_to(index),
                };
            }
            Some(Input::Command(Command::Flip)) => {
                navigator.flip_perspective();
            }
            _ => println!("{VIEW_HELP}"),
        }
    }
    Ok(())
}

async fn save(app: &mut App, name: &str, path: &str) -> anyhow::Result<()> {
    app.session().await?;
    let pgn = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    // reject games that do not replay before uploading them
    Navigator::default().load_pgn(&pgn)?;
    let saved = app
        .api()
        .create_saved_games(&[NewSavedGame {
            pgn,
            name: name.to_string(),
        }])
        .await?;
    println!("Saved \"{name}\". {} games in your library.", saved.len());
    Ok(())
}

async fn edit_saved(app: &mut App, saved_id: &str, name: &str, path: Option<&str>) -> anyhow::Result<()> {
    app.session().await?;
    let api = app.api();
    let pgn = match path {
        Some(path) => {
            let pgn = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
            Navigator::default().load_pgn(&pgn)?;
            pgn
        }
        None => api.saved_game(saved_id).await?.pgn,
    };
    let saved = api
        .update_saved_game(
            saved_id,
            &NewSavedGame {
                pgn,
                name: name.to_string(),
            },
        )
        .await?;
    println!("Updated \"{name}\". {} games in your library.", saved.len());
    Ok(())
}

async fn import_lichess(app: &mut App, username: &str, max: usize) -> anyhow::Result<()> {
    app.session().await?;
    let lichess = LichessClient::new(app.http.clone(), app.config.lichess_url.clone());
    let games = lichess.fetch_user_games(username, max).await?;
    if games.is_empty() {
        println!("No games found for {username}");
        return Ok(());
    }
    let saved = app.api().create_saved_games(&games).await?;
    println!("Imported {} games. {} games in your library.", games.len(), saved.len());
    Ok(())
}

async fn leaderboard(app: &mut App) -> anyhow::Result<()> {
    let client = LeaderboardClient::new(app.http.clone(), app.config.leaderboard_url.clone());
    let players = client.top_players().await?;
    println!("{:>4}  {:<32} {:<4} {:>6}  {}", "#", "Name", "Fed", "Rating", "FIDE id");
    for p in players {
        println!("{:>4}  {:<32} {:<4} {:>6}  {}", p.rank, p.name, p.country, p.rating, p.fide_id);
    }
    Ok(())
}

async fn profile(app: &mut App, user_id: &str) -> anyhow::Result<()> {
    app.session().await?;
    let profile = Profile::load(&app.api(), user_id).await?;
    let stats = &profile.stats;
    let pct = &profile.percentages;

    println!("{}", profile.username);
    if !profile.member_since.is_empty() {
        println!("Member since {}", profile.member_since);
    }
    println!(
        "{} matches  {} wins ({}%)  {} draws ({}%)  {} losses ({}%)\n",
        stats.games_played, stats.wins, pct.wins, stats.draws, pct.draws, stats.losses, pct.losses
    );
    print_matches(&profile.matches);
    Ok(())
}

fn print_matches(matches: &[PastMatch]) {
    if matches.is_empty() {
        println!("No finished matches.");
        return;
    }
    for m in matches {
        let date = m.date.map(|d| d.format("%d/%m/%Y %H:%M").to_string()).unwrap_or_default();
        let result = if m.is_draw() {
            "draw".to_string()
        } else {
            format!("{} won", m.winner)
        };
        println!(
            "{date}  {} vs {}  {result}  ({})  {}",
            m.white,
            m.black,
            describe_duration(m.duration_secs),
            m.game_id
        );
    }
}

fn settings(app: &mut App, background: Option<&String>, piece: Option<&String>) -> anyhow::Result<()> {
    if let Some(background) = background {
        app.auth.storage_mut().set(storage::BACKGROUND, background.as_str())?;
    }
    if let Some(piece) = piece {
        app.auth.storage_mut().set(storage::PIECE, piece.as_str())?;
    }
    let style = app.board_style();
    println!("background: {} ({})", style.background, style.background_image());
    println!("pieces:     {}", style.piece_theme);
    Ok(())
}
