//! Interactive terminal game loop.
//!
//! Input is read line by line. Lines starting with `:` are meta commands
//! and work at every prompt:
//! `:quit`, `:save <file>`, `:admin <secret>`, `:reset <secret>`.

use crate::args::parse_plan;
use crate::render;
use anyhow::Result;
use destiny_core::AllocationPlan;
use destiny_econ::ReturnSource;
use destiny_engine::{Engine, GameSession, Stage};
use persistence::{save_snapshot, AdminGate, RecordStore};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{info, warn};

enum Reply {
    Text(String),
    Replace(GameSession),
    Quit,
}

enum Step {
    Next(GameSession),
    Stay,
    Quit,
}

pub struct Play<'a, R, W> {
    pub engine: &'a Engine,
    pub store: &'a dyn RecordStore,
    pub gate: AdminGate,
    pub capital: f64,
    pub returns: &'a mut dyn ReturnSource,
    pub preset_name: Option<String>,
    pub input: R,
    pub out: W,
}

impl<R: BufRead, W: Write> Play<'_, R, W> {
    /// Drive `session` until the player quits or input ends.
    pub fn run(&mut self, mut session: GameSession) -> Result<GameSession> {
        loop {
            let step = match session.stage() {
                Stage::Login => self.login(&session)?,
                Stage::Setup => self.setup(&session)?,
                Stage::AwaitingTimeJump => self.time_jump(&session)?,
                Stage::AwaitingEventCode => self.event(&session)?,
                Stage::AwaitingRebalance => self.rebalance(&session)?,
                Stage::Finished => self.finish(&session)?,
            };
            match step {
                Step::Next(next) => session = next,
                Step::Stay => {}
                Step::Quit => return Ok(session),
            }
        }
    }

    fn ask(&mut self, session: &GameSession, prompt: &str) -> Result<Reply> {
        loop {
            write!(self.out, "{prompt}> ")?;
            self.out.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.out)?;
                return Ok(Reply::Quit);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            let Some(meta) = line.trim().strip_prefix(':') else {
                return Ok(Reply::Text(line.to_string()));
            };
            let (cmd, arg) = meta.split_once(' ').unwrap_or((meta, ""));
            let arg = arg.trim();
            match cmd {
                "quit" | "q" => return Ok(Reply::Quit),
                "save" if !arg.is_empty() => match save_snapshot(Path::new(arg), session) {
                    Ok(()) => writeln!(self.out, "saved to {arg}")?,
                    Err(e) => writeln!(self.out, "! could not save: {e}")?,
                },
                "admin" => match self.gate.unlock(arg, self.store) {
                    Some(view) => match view.record_count() {
                        Ok(n) => writeln!(self.out, "records: {n}")?,
                        Err(e) => writeln!(self.out, "! {e}")?,
                    },
                    None => writeln!(self.out, "! wrong admin secret")?,
                },
                "reset" => {
                    if self.gate.check(arg) {
                        writeln!(self.out, "session reset")?;
                        return Ok(Reply::Replace(self.engine.reset()));
                    }
                    warn!("forced reset refused");
                    writeln!(self.out, "! wrong admin secret")?;
                }
                _ => writeln!(self.out, "! meta commands: :quit, :save <file>, :admin <secret>, :reset <secret>")?,
            }
        }
    }

    fn report(&mut self, err: impl std::fmt::Display) -> Result<Step> {
        writeln!(self.out, "! {err}")?;
        Ok(Step::Stay)
    }

    fn login(&mut self, session: &GameSession) -> Result<Step> {
        let name = match self.preset_name.take() {
            Some(name) => name,
            None => {
                writeln!(self.out, "Welcome to Flip Your Destiny: thirty years, five assets, three shocks.")?;
                match self.ask(session, "Your name")? {
                    Reply::Text(t) => t,
                    Reply::Replace(s) => return Ok(Step::Next(s)),
                    Reply::Quit => return Ok(Step::Quit),
                }
            }
        };
        match self.engine.start_session(session, &name) {
            Ok(next) => Ok(Step::Next(next)),
            Err(e) => self.report(e),
        }
    }

    fn setup(&mut self, session: &GameSession) -> Result<Step> {
        write!(self.out, "{}", render::rates(self.engine.profile()))?;
        writeln!(
            self.out,
            "{}, you have {} to invest.",
            session.player(),
            render::money(self.capital)
        )?;
        let text = match self.ask(session, "Allocation % (dividend,us_bond,tw_stock,cash,crypto)")? {
            Reply::Text(t) => t,
            Reply::Replace(s) => return Ok(Step::Next(s)),
            Reply::Quit => return Ok(Step::Quit),
        };
        let plan = match parse_plan(&text) {
            Ok(plan) => plan,
            Err(e) => return self.report(e),
        };
        match self
            .engine
            .confirm_initial_allocation(session, &plan, self.capital)
        {
            Ok(next) => Ok(Step::Next(next)),
            Err(e) => self.report(e),
        }
    }

    fn time_jump(&mut self, session: &GameSession) -> Result<Step> {
        write!(self.out, "{}", render::holdings(session))?;
        let hint = if session.year() == 0 {
            "Enter to advance 10 years, 'back' to change the allocation"
        } else {
            "Enter to advance 10 years"
        };
        let text = match self.ask(session, hint)? {
            Reply::Text(t) => t,
            Reply::Replace(s) => return Ok(Step::Next(s)),
            Reply::Quit => return Ok(Step::Quit),
        };
        let result = if text.trim().eq_ignore_ascii_case("back") {
            self.engine.return_to_setup(session)
        } else {
            self.engine.advance_decade(session, &mut *self.returns)
        };
        match result {
            Ok(next) => Ok(Step::Next(next)),
            Err(e) => self.report(e),
        }
    }

    fn event(&mut self, session: &GameSession) -> Result<Step> {
        write!(self.out, "{}", render::holdings(session))?;
        let code = match self.ask(session, "Draw a card and enter its code")? {
            Reply::Text(t) => t,
            Reply::Replace(s) => return Ok(Step::Next(s)),
            Reply::Quit => return Ok(Step::Quit),
        };
        let Some(preview) = self.engine.preview_event(session, &code) else {
            return self.report(format!("unknown event card code: {:?}", code.trim()));
        };
        write!(self.out, "{}", render::preview(&preview))?;
        match self.ask(session, "Apply this card? [Y/n]")? {
            Reply::Text(t) if t.trim().eq_ignore_ascii_case("n") => Ok(Step::Stay),
            Reply::Text(_) => match self.engine.apply_event(session, &preview.card.code) {
                Ok(next) => Ok(Step::Next(next)),
                Err(e) => self.report(e),
            },
            Reply::Replace(s) => Ok(Step::Next(s)),
            Reply::Quit => Ok(Step::Quit),
        }
    }

    fn rebalance(&mut self, session: &GameSession) -> Result<Step> {
        write!(self.out, "{}", render::holdings(session))?;
        let suggested = session.suggested_plan();
        let prompt = format!(
            "New allocation % (enter keeps {})",
            render::plan_inline(&suggested)
        );
        let text = match self.ask(session, &prompt)? {
            Reply::Text(t) => t,
            Reply::Replace(s) => return Ok(Step::Next(s)),
            Reply::Quit => return Ok(Step::Quit),
        };
        let plan: AllocationPlan = if text.trim().is_empty() {
            suggested
        } else {
            match parse_plan(&text) {
                Ok(plan) => plan,
                Err(e) => return self.report(e),
            }
        };
        match self.engine.rebalance(session, &plan) {
            Ok(next) => Ok(Step::Next(next)),
            Err(e) => self.report(e),
        }
    }

    fn finish(&mut self, session: &GameSession) -> Result<Step> {
        if !session.is_persisted() {
            write!(self.out, "{}", render::summary(session))?;
            let feedback = match self.ask(session, "Any feedback on the game?")? {
                Reply::Text(t) => t,
                Reply::Replace(s) => return Ok(Step::Next(s)),
                Reply::Quit => return Ok(Step::Quit),
            };
            return match self.engine.finish_and_persist(session, feedback.trim(), self.store) {
                Ok(next) => {
                    writeln!(self.out, "Thanks, your result has been saved.")?;
                    Ok(Step::Next(next))
                }
                Err(e) => self.report(e),
            };
        }
        match self.ask(session, "Play again? [y/N]")? {
            Reply::Text(t) if t.trim().eq_ignore_ascii_case("y") => {
                info!(player = %session.player(), "new challenge");
                Ok(Step::Next(self.engine.reset()))
            }
            Reply::Replace(s) => Ok(Step::Next(s)),
            Reply::Text(_) | Reply::Quit => Ok(Step::Quit),
        }
    }
}
