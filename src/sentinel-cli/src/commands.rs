//! Command handlers.

use anyhow::{Context, Result, bail};
use sentinel_auth::models::{FactResponse, Session};
use sentinel_auth::{AuthError, DecodedClaims, SessionState};
use std::io::{IsTerminal, Read};

use crate::cli::{Commands, LoginArgs, PasswordArgs, RegisterArgs, SessionsCommand, StatusArgs};
use crate::context::AppContext;
use crate::styled_output::{print_dim, print_info, print_success};

/// Run `command` against `ctx`.
pub async fn dispatch(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Login(args) => run_login(ctx, args).await,
        Commands::Register(args) => run_register(ctx, args).await,
        Commands::Logout => run_logout(ctx).await,
        Commands::Status(args) => run_status(ctx, args),
        Commands::Sessions(command) => run_sessions(ctx, command).await,
        Commands::Keepalive => run_keepalive(ctx).await,
        Commands::Tip { json } => run_tip(ctx, json).await,
    }
}

async fn run_login(ctx: &AppContext, args: LoginArgs) -> Result<()> {
    let password = read_password(&args.password)?;
    ctx.manager.login(&args.email, &password).await?;
    print_success(&format!("Signed in as {}", args.email));
    Ok(())
}

async fn run_register(ctx: &AppContext, args: RegisterArgs) -> Result<()> {
    let password = read_password(&args.password)?;
    ctx.manager
        .register(&args.name, &args.email, &password)
        .await?;
    print_success(&format!("Account created. Signed in as {}", args.email));
    Ok(())
}

async fn run_logout(ctx: &AppContext) -> Result<()> {
    if !ctx.manager.is_authenticated() {
        print_dim("Not signed in.");
        return Ok(());
    }
    ctx.manager.logout().await;
    print_success("Signed out.");
    Ok(())
}

fn run_status(ctx: &AppContext, args: StatusArgs) -> Result<()> {
    let state = ctx.manager.state();
    if args.json {
        let value = serde_json::json!({
            "phase": state.phase.to_string(),
            "api": ctx.config.api_base_url,
            "identity": state.identity,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", describe_state(&state, chrono::Utc::now().timestamp()));
    Ok(())
}

async fn run_sessions(ctx: &AppContext, command: SessionsCommand) -> Result<()> {
    ensure_signed_in(ctx).await?;

    match command {
        SessionsCommand::List { json } => {
            let sessions = ctx
                .client
                .list_sessions()
                .await
                .context("Failed to list sessions")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                print_dim("No active sessions.");
            } else {
                for session in &sessions {
                    println!("{}", describe_session(session));
                }
            }
        }
        SessionsCommand::Revoke { session_id } => {
            let response = ctx
                .client
                .revoke_session(&session_id)
                .await
                .with_context(|| format!("Failed to revoke session {session_id}"))?;
            print_success(&response.message);
        }
        SessionsCommand::RevokeOthers => {
            let response = ctx
                .client
                .revoke_other_sessions()
                .await
                .context("Failed to revoke other sessions")?;
            match response.deleted_count {
                Some(count) => print_success(&format!("{} ({count} revoked)", response.message)),
                None => print_success(&response.message),
            }
        }
    }
    Ok(())
}

async fn run_keepalive(ctx: &AppContext) -> Result<()> {
    ensure_signed_in(ctx).await?;

    let _renewals = ctx
        .manager
        .coordinator()
        .on_renewed(|_| print_info("Access credential renewed."));
    let mut state = ctx.manager.subscribe();

    print_info("Keeping session alive. Press Ctrl+C to stop.");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            print_dim("Stopped.");
            Ok(())
        }
        _ = state.wait_for(|s| !s.is_authenticated()) => {
            bail!("Session ended. Sign in again with `sentinel login`.")
        }
    }
}

async fn run_tip(ctx: &AppContext, json: bool) -> Result<()> {
    ensure_signed_in(ctx).await?;

    let fact = ctx.client.get_fact().await.context("Failed to fetch a tip")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&fact)?);
    } else {
        println!("{}", describe_fact(&fact));
    }
    Ok(())
}

async fn ensure_signed_in(ctx: &AppContext) -> Result<()> {
    match ctx.manager.require_authenticated().await {
        Ok(_) => Ok(()),
        Err(AuthError::NotAuthenticated) => {
            bail!("Not signed in. Run `sentinel login <email>` first.")
        }
        Err(e) => Err(e.into()),
    }
}

fn read_password(args: &PasswordArgs) -> Result<String> {
    if let Some(password) = &args.password {
        return Ok(password.clone());
    }

    let password = if args.password_stdin {
        let mut stdin = std::io::stdin();
        if stdin.is_terminal() {
            bail!("--password-stdin expects input from stdin. Try piping it: echo $PASSWORD | sentinel login <email> --password-stdin");
        }
        let mut buffer = String::new();
        stdin
            .read_to_string(&mut buffer)
            .context("Failed to read password from stdin")?;
        buffer
    } else {
        inquire::Password::new("Password:")
            .without_confirmation()
            .prompt()
            .context("Failed to read password")?
    };

    let password = password.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}

/// Human-readable summary of the session.
pub fn describe_state(state: &SessionState, now: i64) -> String {
    if !state.is_authenticated() {
        return format!("Not signed in ({})", state.phase);
    }
    match &state.identity {
        Some(identity) => describe_identity(identity, now),
        None => "Signed in (identity unavailable)".to_string(),
    }
}

fn describe_identity(identity: &DecodedClaims, now: i64) -> String {
    let mut lines = vec![format!("Signed in as {}", display_name(identity))];
    lines.push(format!("  User:    {}", identity.subject_id));
    if let Some(session_id) = &identity.session_id {
        lines.push(format!("  Session: {session_id}"));
    }

    let expires = chrono::DateTime::from_timestamp(identity.expires_at, 0)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| identity.expires_at.to_string());
    let remaining = identity.time_until_expiry(now);
    if remaining > 0 {
        lines.push(format!("  Expires: {expires} (in {})", format_duration(remaining)));
    } else {
        lines.push(format!("  Expires: {expires} (expired, renews on next use)"));
    }
    lines.join("\n")
}

fn display_name(identity: &DecodedClaims) -> &str {
    if identity.email.is_empty() {
        &identity.subject_id
    } else {
        &identity.email
    }
}

/// One line per session: current marker, id, then the raw fields the server sent.
pub fn describe_session(session: &Session) -> String {
    let marker = if session.is_current { "*" } else { " " };
    let fields = [
        ("ip", session.ip.as_deref()),
        ("browser", session.browser.as_deref()),
        ("os", session.os.as_deref()),
        ("country", session.country_code.as_deref()),
    ];

    let mut line = format!("{marker} {}", session.session_id);
    for (name, value) in fields {
        if let Some(value) = value {
            line.push_str(&format!("  {name}={value}"));
        }
    }
    line
}

pub fn describe_fact(fact: &FactResponse) -> String {
    format!("Tip #{}: {}", fact.tip.index, fact.tip.tip)
}

fn format_duration(secs: i64) -> String {
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m {}s", s / 60, s % 60),
        s => format!("{}h {}m", s / 3600, (s % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sentinel_auth::{CredentialPair, SessionPhase};

    fn session(id: &str) -> Session {
        serde_json::from_value(serde_json::json!({"sessionId": id})).unwrap()
    }

    #[test]
    fn test_describe_unauthenticated() {
        let state = SessionState::unauthenticated();
        assert_eq!(describe_state(&state, 0), "Not signed in (unauthenticated)");
    }

    #[test]
    fn test_describe_identity() {
        let identity = DecodedClaims {
            subject_id: "user-1".to_string(),
            email: "ada@example.com".to_string(),
            session_id: Some("sess-1".to_string()),
            expires_at: 1_000 + 3_725,
        };
        let state = SessionState::authenticated(CredentialPair::new("a", "r"), Some(identity));
        assert_eq!(state.phase, SessionPhase::Authenticated);

        let text = describe_state(&state, 1_000);
        assert!(text.starts_with("Signed in as ada@example.com"));
        assert!(text.contains("Session: sess-1"));
        assert!(text.contains("(in 1h 2m)"));
    }

    #[test]
    fn test_describe_session_skips_missing_fields() {
        assert_eq!(describe_session(&session("s-1")), "  s-1");

        let mut current = session("s-2");
        current.is_current = true;
        current.browser = Some("Firefox".to_string());
        current.os = Some("Linux".to_string());
        current.country_code = Some("DE".to_string());
        assert_eq!(
            describe_session(&current),
            "* s-2  browser=Firefox  os=Linux  country=DE"
        );
    }

    #[test]
    fn test_describe_fact() {
        let fact: FactResponse = serde_json::from_value(serde_json::json!({
            "Tip": {"index": 4, "tip": "Keep your recovery codes offline."}
        }))
        .unwrap();
        assert_eq!(describe_fact(&fact), "Tip #4: Keep your recovery codes offline.");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(61), "1m 1s");
        assert_eq!(format_duration(7_260), "2h 1m");
    }
}
