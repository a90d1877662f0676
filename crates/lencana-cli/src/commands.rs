//! Subcommands. Each one fetches a fresh snapshot, runs the core routine
//! over it and prints plain text to stdout.

use std::{
  fmt::Write as _,
  io::{self, BufRead, Write as _},
  path::PathBuf,
};

use anyhow::{Context as _, bail};
use chrono::{Datelike, Local, NaiveDate, Utc};
use clap::{ArgAction, Args, Subcommand};
use lencana_client::ApiClient;
use lencana_core::{
  access::{self, AccessFlag, AccessFlags, AccessOverrides, AdminRole, QueryParams, Scope, Session},
  cohort::{self, CohortHistory, YearCell},
  gate::Gate,
  normalize::{self, NormalizeOptions},
  promotion::{self, PromotionRequest},
  record::{self, SubmissionRecord},
  registration::LeaderInfo,
  role::RoleCategory,
  snapshot::Snapshot,
};
use lencana_import::{Field, ImportDefaults, ImportSession};
use strum::IntoEnumIterator;

use crate::settings::Settings;

// ─── Command tree ─────────────────────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Award history, one row per student and one column per year.
  History(HistoryArgs),
  /// Three-year progression blocks grouped by first award year.
  Cohorts(ViewArgs),
  /// List or register last year's holders for the next badge tier.
  Promote(PromoteArgs),
  /// Read a spreadsheet and register its rows, one batch per school.
  Import(ImportArgs),
  /// Show what a school may currently add, submit and edit.
  Gate(GateArgs),
  /// Inspect or change the portal access flags.
  #[command(subcommand)]
  Access(AccessCommand),
  #[command(subcommand)]
  Login(LoginCommand),
  Logout,
}

#[derive(Args, Debug)]
pub struct ViewArgs {
  /// Restrict to one school. Schools always see only themselves.
  #[arg(long)]
  school:    Option<String>,
  /// Include leaders, assistant leaders and examiners.
  #[arg(long)]
  all_roles: bool,
  /// Include badge years the school has not had approved yet.
  #[arg(long)]
  drafts:    bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
  #[command(flatten)]
  view:   ViewArgs,
  /// Fuzzy match on name or IC.
  #[arg(short, long)]
  search: Option<String>,
}

#[derive(Args, Debug)]
pub struct PromoteArgs {
  /// Badge held in the source year, e.g. "Keris Gangsa".
  #[arg(long)]
  badge:        String,
  /// Year the source badge was awarded. Defaults to last year.
  #[arg(long)]
  year:         Option<i32>,
  #[arg(long, default_value = "participant")]
  category:     RoleCategory,
  #[arg(long)]
  school:       Option<String>,
  /// Promote only these people (name or IC). Repeatable.
  #[arg(long, value_name = "NAME_OR_IC")]
  only:         Vec<String>,
  /// Leader for the new batch. Defaults to the last leader used.
  #[arg(long)]
  leader:       Option<String>,
  #[arg(long)]
  leader_phone: Option<String>,
  #[arg(long)]
  leader_race:  Option<String>,
  /// Send the registration. Without this the candidates are only listed.
  #[arg(long)]
  submit:       bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
  /// Spreadsheet (.xlsx, .xls, .ods, ...) or .csv file.
  file:   PathBuf,
  /// Badge to register every row under.
  #[arg(long)]
  badge:  String,
  /// Registration date. Defaults to today.
  #[arg(long)]
  date:   Option<NaiveDate>,
  /// School for rows that carry none.
  #[arg(long)]
  school: Option<String>,
  /// Override a column, e.g. `ic=3` (1-based) or `phone=none`. Repeatable.
  #[arg(long, value_name = "FIELD=COLUMN", value_parser = parse_mapping)]
  map:    Vec<(Field, Option<usize>)>,
  /// Send the batches. Without this the plan is only printed.
  #[arg(long)]
  submit: bool,
}

#[derive(Args, Debug)]
pub struct GateArgs {
  #[arg(long)]
  school: Option<String>,
  /// Check submission of this badge rather than plain additions.
  #[arg(long)]
  badge:  Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum AccessCommand {
  /// Effective flags and the layer each one comes from.
  Show {
    /// Query string to layer in, e.g. `userAccess=false&admin`.
    #[arg(long)]
    query: Option<String>,
  },
  /// Set a local developer toggle.
  Set {
    flag:  AccessFlag,
    #[arg(action = ArgAction::Set)]
    value: bool,
  },
  /// Clear every local developer toggle.
  Reset,
}

#[derive(Subcommand, Debug)]
pub enum LoginCommand {
  /// Log in as a school.
  School {
    code:     String,
    /// Prompted for when absent.
    #[arg(long, env = "LENCANA_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
  /// Log in as a state, district or developer admin.
  Admin {
    username: String,
    #[arg(long, env = "LENCANA_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
}

// ─── Context ──────────────────────────────────────────────────────────────────

/// What every command needs: the client, the deployment flags and today.
pub struct Ctx {
  client:     ApiClient,
  deployment: Option<AccessOverrides>,
  today:      NaiveDate,
}

impl Ctx {
  /// Expire an idle session, load the deployment flags, and log out a
  /// session they no longer permit.
  pub async fn open(client: ApiClient, settings: &Settings) -> anyhow::Result<Self> {
    let now = Utc::now();
    if client.state().expire_idle(now).await? {
      eprintln!("Session expired after inactivity; log in again.");
    }
    let deployment = match &settings.deployment_config_url {
      Some(url) => client.load_deployment_config(url).await,
      None => None,
    };
    let ctx = Self { client, deployment, today: Local::now().date_naive() };
    ctx.enforce().await?;
    if ctx.session().is_some() {
      ctx.client.state().touch(now).await?;
    }
    Ok(ctx)
  }

  fn flags(&self, query: &QueryParams) -> AccessFlags {
    self.client.access_flags(query, self.deployment.as_ref())
  }

  async fn enforce(&self) -> anyhow::Result<()> {
    let flags = self.flags(&QueryParams::default());
    if self.client.state().enforce_access(&flags).await? {
      eprintln!("Access for this account has been switched off; you have been logged out.");
    }
    Ok(())
  }

  fn session(&self) -> Option<Session> { self.client.state().get().session }

  /// The current session, unless nobody is logged in or the maintenance
  /// page hides the portal.
  fn require_session(&self) -> anyhow::Result<Session> {
    let session = self
      .session()
      .context("not logged in; run `lencana login` first")?;
    let flags = self.flags(&QueryParams::default());
    if access::maintenance_blocks(&flags, Some(&session), false) {
      bail!("the portal is under maintenance; try again later");
    }
    Ok(session)
  }

  async fn snapshot(&self) -> anyhow::Result<Snapshot> {
    let snapshot = self.client.fetch_snapshot().await?;
    tracing::debug!(
      records = snapshot.records.len(),
      schools = snapshot.schools.len(),
      "fetched snapshot"
    );
    Ok(snapshot)
  }
}

pub async fn dispatch(ctx: &Ctx, command: Command) -> anyhow::Result<()> {
  match command {
    Command::History(args) => run_history(ctx, &args).await,
    Command::Cohorts(args) => run_cohorts(ctx, &args).await,
    Command::Promote(args) => run_promote(ctx, &args).await,
    Command::Import(args) => run_import(ctx, &args).await,
    Command::Gate(args) => run_gate(ctx, &args).await,
    Command::Access(cmd) => run_access(ctx, cmd).await,
    Command::Login(cmd) => run_login(ctx, cmd).await,
    Command::Logout => {
      ctx.client.logout().await?;
      println!("Logged out.");
      Ok(())
    }
  }
}

// ─── Views ────────────────────────────────────────────────────────────────────

async fn run_history(ctx: &Ctx, args: &HistoryArgs) -> anyhow::Result<()> {
  let session = ctx.require_session()?;
  let snapshot = ctx.snapshot().await?;
  let history = build_history(&session, &snapshot, &args.view)?;
  let entries = history.search(args.search.as_deref().unwrap_or(""));

  let mut header = format!("{:<32} {:<14}", "NAME", "IC");
  for year in &history.years {
    write!(header, " {year:<28}")?;
  }
  println!("{}", header.trim_end());

  for entry in &entries {
    let mut line = format!("{:<32} {:<14}", entry.name, entry.ic);
    for year in &history.years {
      write!(line, " {:<28}", cell_text(entry.cell(*year)))?;
    }
    if entry.years.keys().any(|y| !y.is_known()) {
      line.push_str(" [undated]");
    }
    println!("{}", line.trim_end());
  }
  println!("\n{} student(s)", entries.len());
  Ok(())
}

async fn run_cohorts(ctx: &Ctx, args: &ViewArgs) -> anyhow::Result<()> {
  let session = ctx.require_session()?;
  let snapshot = ctx.snapshot().await?;
  let history = build_history(&session, &snapshot, args)?;
  let blocks = cohort::cohort_blocks(&history);

  for block in &blocks.blocks {
    let [first, second, third] = block.columns();
    println!("Cohort {first}: {} student(s)", block.rows.len());
    println!("{:<32} {first:<28} {second:<28} {third}", "NAME");
    for row in &block.rows {
      let [a, b, c] = row.cells.map(cell_text);
      println!("{}", format!("{:<32} {a:<28} {b:<28} {c}", row.entry.name).trim_end());
    }
    println!();
  }

  if !blocks.undated.is_empty() {
    println!("No award year on record:");
    for entry in &blocks.undated {
      println!("  {} ({})", entry.name, entry.ic);
    }
  }
  Ok(())
}

/// Normalise the records `session` may see and project them into history.
/// Column years come from the whole snapshot.
fn build_history(
  session: &Session,
  snapshot: &Snapshot,
  view: &ViewArgs,
) -> anyhow::Result<CohortHistory> {
  let school = match (session, view.school.as_deref()) {
    (Session::Admin(_), None) => None,
    (_, requested) => Some(acting_school(session, snapshot, requested)?),
  };
  let opts = NormalizeOptions {
    school,
    participants_only: !view.all_roles,
    include_drafts: view.drafts,
  };
  let visible = scoped_records(session, snapshot);
  let normalized = normalize::normalize(visible, &snapshot.schools, &opts);
  Ok(CohortHistory::build(&normalized, &snapshot.records))
}

fn cell_text(cell: Option<&YearCell>) -> String {
  cell.map_or_else(String::new, |c| format!("{} ({})", c.badge, c.membership_id))
}

// ─── Promotion ────────────────────────────────────────────────────────────────

async fn run_promote(ctx: &Ctx, args: &PromoteArgs) -> anyhow::Result<()> {
  let session = ctx.require_session()?;
  let snapshot = ctx.snapshot().await?;
  let school = acting_school(&session, &snapshot, args.school.as_deref())?;

  let request = PromotionRequest {
    school:       school.clone(),
    source_year:  args.year.unwrap_or(ctx.today.year() - 1),
    source_badge: args.badge.trim().to_owned(),
    category:     args.category,
  };
  let Some(target) = request.target_tier() else {
    bail!("{} has no next tier", request.source_badge);
  };
  let target_year = request.target_year()?;

  let selected: Vec<SubmissionRecord> = promotion::promotion_candidates(&snapshot.records, &request)
    .into_iter()
    .filter(|r| selects(&args.only, r))
    .collect();

  println!(
    "{} candidate(s) for {target} {} at {school}:",
    selected.len(),
    target_year
  );
  for r in &selected {
    println!("  {:<32} {}", r.name.trim(), r.ic.as_deref().unwrap_or("-"));
  }
  if selected.is_empty() {
    return Ok(());
  }
  if !args.submit {
    println!("\nPass --submit to register them.");
    return Ok(());
  }

  let leader = leader_for(
    ctx,
    &snapshot,
    &school,
    args.leader.as_deref(),
    args.leader_phone.as_deref(),
    args.leader_race.as_deref(),
  );
  ctx
    .client
    .promote(&snapshot, &request, &selected, leader, ctx.today)
    .await?;
  println!("Registered {} for {target} {target_year}.", selected.len());
  Ok(())
}

/// Whether `record` is picked by `only`. An empty list picks everyone.
fn selects(only: &[String], record: &SubmissionRecord) -> bool {
  only.is_empty()
    || only.iter().any(|q| {
      record::normalize_name(q) == record::normalize_name(&record.name)
        || record
          .normalized_ic()
          .is_some_and(|ic| ic == record::normalize_ic(q))
    })
}

/// Leader details for a new batch: explicit flags first, then the last
/// leader used for this school, then the placeholder.
fn leader_for(
  ctx: &Ctx,
  snapshot: &Snapshot,
  school: &str,
  name: Option<&str>,
  phone: Option<&str>,
  race: Option<&str>,
) -> LeaderInfo {
  let code = snapshot.school(school).and_then(|s| s.code.clone());
  let cached = ctx
    .client
    .state()
    .get()
    .leader
    .filter(|l| l.school.trim().eq_ignore_ascii_case(school.trim()));
  match (name, cached) {
    (Some(name), _) => LeaderInfo {
      name:        name.trim().to_owned(),
      phone:       phone.map(str::to_owned),
      race:        race.unwrap_or_default().to_owned(),
      school:      school.to_owned(),
      school_code: code,
    },
    (None, Some(leader)) => leader,
    (None, None) => LeaderInfo::placeholder(school, code),
  }
}

// ─── Import ───────────────────────────────────────────────────────────────────

async fn run_import(ctx: &Ctx, args: &ImportArgs) -> anyhow::Result<()> {
  let session = ctx.require_session()?;
  let snapshot = ctx.snapshot().await?;
  let school = match (&session, args.school.as_deref()) {
    (Session::Admin(_), None) => String::new(),
    (_, requested) => acting_school(&session, &snapshot, requested)?,
  };
  let code = snapshot.school(&school).and_then(|s| s.code.clone());

  let mut import = ImportSession::open(&args.file, ImportDefaults { school, code })
    .with_context(|| format!("failed to read {}", args.file.display()))?;
  for (field, column) in &args.map {
    import.set_column(*field, *column)?;
  }
  print_mapping(&import);

  let mut batches = import.batches(args.badge.trim(), args.date.unwrap_or(ctx.today));
  batches.retain(|b| match submit_refusal(&session, &snapshot, b.school()) {
    Some(reason) => {
      tracing::warn!(school = b.school(), reason, "skipping school");
      false
    }
    None => true,
  });
  if batches.is_empty() {
    bail!("nothing to register; check the column mapping with --map");
  }

  println!();
  for b in &batches {
    println!(
      "  {} [{}]: {} participant(s), {} assistant(s), {} examiner(s); leader {}",
      b.school(),
      b.leader.school_code.as_deref().unwrap_or("-"),
      b.count(RoleCategory::Participant),
      b.count(RoleCategory::Assistant),
      b.count(RoleCategory::Examiner),
      b.leader.name,
    );
  }
  if !args.submit {
    println!("\nPass --submit to send {} group(s).", batches.len());
    return Ok(());
  }

  println!();
  let outcomes = ctx.client.submit_batches(&batches, &snapshot, ctx.today).await;
  let mut failed = 0;
  for outcome in &outcomes {
    match &outcome.result {
      Ok(_) => println!("  ok      {} ({} people)", outcome.school, outcome.participants),
      Err(e) => {
        failed += 1;
        println!("  failed  {}: {}", outcome.school, e.user_message());
      }
    }
  }
  if failed > 0 {
    bail!("{failed} of {} group(s) failed", outcomes.len());
  }
  Ok(())
}

fn print_mapping(import: &ImportSession) {
  match import.header_row() {
    Some(h) => println!("Header on row {}; data from row {}.", h + 1, import.data_start() + 1),
    None => println!("No header row found; reading from row 1."),
  }
  let mapping = import.mapping();
  for field in Field::iter() {
    let label = field.to_string();
    match mapping.get(field) {
      Some(c) if mapping.is_guessed(field) => println!("  {label:<14} column {} (guessed)", c + 1),
      Some(c) => println!("  {label:<14} column {}", c + 1),
      None => println!("  {label:<14} -"),
    }
  }
  println!("{} row(s) read.", import.rows().len());
}

/// `FIELD=COLUMN`, with a 1-based column or `none`.
fn parse_mapping(raw: &str) -> Result<(Field, Option<usize>), String> {
  let (field, column) = raw
    .split_once('=')
    .ok_or_else(|| format!("expected FIELD=COLUMN, got {raw:?}"))?;
  let field: Field = field
    .trim()
    .parse()
    .map_err(|_| format!("unknown field {:?}", field.trim()))?;
  let column = match column.trim() {
    c if c.eq_ignore_ascii_case("none") => None,
    c => match c.parse::<usize>() {
      Ok(n) if n >= 1 => Some(n - 1),
      _ => return Err(format!("column must be a number from 1, got {c:?}")),
    },
  };
  Ok((field, column))
}

// ─── Gate ─────────────────────────────────────────────────────────────────────

async fn run_gate(ctx: &Ctx, args: &GateArgs) -> anyhow::Result<()> {
  let session = ctx.require_session()?;
  let snapshot = ctx.snapshot().await?;
  let school = acting_school(&session, &snapshot, args.school.as_deref())?;
  let gate = Gate::for_school(&snapshot, &school, ctx.today)
    .with_context(|| format!("unknown school: {school}"))?;

  println!("{} ({})", gate.school.name, gate.school.code.as_deref().unwrap_or("-"));
  println!("Registration {}", if gate.registration_open { "open" } else { "closed" });
  for category in RoleCategory::iter() {
    let verdict = match &args.badge {
      Some(badge) => gate.check_submit(category, badge.trim()),
      None => gate.check_add(category),
    };
    let verdict = verdict.map_or_else(|d| format!("no, {d}"), |()| "yes".to_owned());
    println!("  {:<12} {verdict}", category.to_string());
  }
  println!("Locked:   {}", gate.school.locked_badges.join(", "));
  println!("Approved: {}", gate.school.approved_badges.join(", "));

  let (editable, frozen) = snapshot
    .records_for(&school)
    .filter(|r| !r.is_session_marker())
    .fold((0, 0), |(e, f), r| {
      if gate.can_modify_record(r) { (e + 1, f) } else { (e, f + 1) }
    });
  println!("Records in {}: {editable} editable, {frozen} frozen", gate.current_year);
  Ok(())
}

// ─── Access and login ─────────────────────────────────────────────────────────

async fn run_access(ctx: &Ctx, cmd: AccessCommand) -> anyhow::Result<()> {
  match cmd {
    AccessCommand::Show { query } => {
      let query = QueryParams::parse_str(query.as_deref().unwrap_or(""));
      let flags = ctx.flags(&query);
      let local = ctx.client.state().get().access;
      for flag in AccessFlag::iter() {
        let layer = layer_of(flag, &local, &query.overrides, ctx.deployment.as_ref());
        println!("{:<16} {:<6} ({layer})", flag.to_string(), flags.get(flag));
      }
      let session = ctx.session();
      if access::maintenance_blocks(&flags, session.as_ref(), query.admin_bypass) {
        println!("\nThe maintenance page is showing.");
      }
      match &session {
        Some(s) => println!("\nLogged in as {}.", describe_session(s)),
        None => println!("\nNot logged in."),
      }
      Ok(())
    }
    AccessCommand::Set { flag, value } => {
      require_developer(ctx)?;
      ctx.client.state().update(|s| s.access.set(flag, value)).await?;
      println!("{flag} set to {value} locally.");
      if let Some(pinned) = ctx.deployment.and_then(|d| d.get(flag))
        && pinned != value
      {
        println!("The deployment config pins {flag} to {pinned}; the local toggle has no effect.");
      }
      ctx.enforce().await
    }
    AccessCommand::Reset => {
      require_developer(ctx)?;
      ctx
        .client
        .state()
        .update(|s| s.access = AccessOverrides::default())
        .await?;
      println!("Local toggles cleared.");
      ctx.enforce().await
    }
  }
}

fn require_developer(ctx: &Ctx) -> anyhow::Result<()> {
  if !ctx.session().as_ref().is_some_and(Session::is_developer) {
    bail!("only a developer session can change access toggles");
  }
  Ok(())
}

/// Which layer decides `flag`, highest priority first.
fn layer_of(
  flag: AccessFlag,
  local: &AccessOverrides,
  query: &AccessOverrides,
  deployment: Option<&AccessOverrides>,
) -> &'static str {
  if deployment.and_then(|d| d.get(flag)).is_some() {
    "deployment"
  } else if query.get(flag).is_some() {
    "query"
  } else if local.get(flag).is_some() {
    "local"
  } else {
    "default"
  }
}

async fn run_login(ctx: &Ctx, cmd: LoginCommand) -> anyhow::Result<()> {
  let flags = ctx.flags(&QueryParams::default());
  let session = match cmd {
    LoginCommand::School { code, password } => {
      if !flags.user_access {
        bail!("school login is currently switched off");
      }
      let password = password_or_prompt(password)?;
      ctx.client.login_user(code.trim(), &password).await?
    }
    LoginCommand::Admin { username, password } => {
      let password = password_or_prompt(password)?;
      ctx.client.login_admin(username.trim(), &password).await?
    }
  };
  if !session.allowed_by(&flags) {
    ctx.client.logout().await?;
    bail!("logins for {} are currently switched off", describe_session(&session));
  }
  println!("Logged in as {}.", describe_session(&session));
  Ok(())
}

/// Use the given password, or read one line from stdin.
fn password_or_prompt(given: Option<String>) -> anyhow::Result<String> {
  if let Some(password) = given {
    return Ok(password);
  }
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin()
    .lock()
    .read_line(&mut line)
    .context("failed to read password")?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}

fn describe_session(session: &Session) -> String {
  match session {
    Session::School { school_name, school_code } => {
      format!("{school_name} ({})", school_code.as_deref().unwrap_or("-"))
    }
    Session::Admin(AdminRole::Developer) => "developer".to_owned(),
    Session::Admin(AdminRole::State { state_code }) => format!("state admin {state_code}"),
    Session::Admin(AdminRole::District { state_code, district_code }) => {
      format!("district admin {state_code}/{district_code}")
    }
  }
}

// ─── Scope helpers ────────────────────────────────────────────────────────────

/// The school a command acts for. A school acts for itself; an admin names
/// one inside their region.
fn acting_school(
  session: &Session,
  snapshot: &Snapshot,
  requested: Option<&str>,
) -> anyhow::Result<String> {
  match session {
    Session::School { school_name, .. } => {
      if let Some(r) = requested
        && !r.trim().eq_ignore_ascii_case(school_name.trim())
      {
        bail!("logged in as {school_name}; cannot act for {r}");
      }
      Ok(school_name.clone())
    }
    Session::Admin(role) => {
      let name = requested.context("--school is required for admin sessions")?;
      let school = snapshot
        .school(name)
        .with_context(|| format!("unknown school: {name}"))?;
      if !Scope::from(role).visible_school(school) {
        bail!("{} is outside your region", school.name);
      }
      Ok(school.name.clone())
    }
  }
}

/// Why `session` may not submit for `school`, if it may not. Only schools
/// already in the snapshot are accepted.
fn submit_refusal(session: &Session, snapshot: &Snapshot, school: &str) -> Option<&'static str> {
  let Some(known) = snapshot.school(school) else {
    return Some("unknown school");
  };
  match session {
    Session::School { school_name, .. } if !known.is_named(school_name) => Some("not your school"),
    Session::Admin(role) if !Scope::from(role).visible_school(known) => Some("outside your region"),
    _ => None,
  }
}

/// Records inside the session's region. Schools are narrowed later by name.
fn scoped_records<'a>(session: &Session, snapshot: &'a Snapshot) -> Vec<&'a SubmissionRecord> {
  let scope = match session {
    Session::School { .. } => None,
    Session::Admin(role) => Some(Scope::from(role)),
  };
  snapshot
    .records
    .iter()
    .filter(|r| {
      scope
        .as_ref()
        .is_none_or(|s| s.visible_record(r, &snapshot.schools))
    })
    .collect()
}
