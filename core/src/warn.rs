use crate::LightContext;
use ansi_term::{
    Color::{Green, Yellow},
    Style,
};
use anyhow::{Result, bail};
use bitflags::bitflags;
use heck::ToKebabCase;
use once_cell::sync::Lazy;
use std::{
    collections::BTreeMap,
    io::{IsTerminal, stdout},
    sync::Mutex,
};

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[non_exhaustive]
#[remain::sorted]
pub enum Warning {
    All,
    CommandTimedOut,
    TestsNotFound,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{self:?}").to_kebab_case())
    }
}

bitflags! {
    #[derive(Clone, Copy)]
    pub struct Flags: u8 {
        const ONCE = 1 << 0;
    }
}

bitflags! {
    #[derive(Clone, Copy)]
    struct State: u8 {
        const ALLOW_MSG_EMITTED = 1 << 0;
        const WARNING_EMITTED = 1 << 1;
    }
}

static WARNING_STATE_MAP: Lazy<Mutex<BTreeMap<Warning, State>>> =
    Lazy::new(|| Mutex::new(BTreeMap::new()));

pub fn warn(context: &LightContext, warning: Warning, msg: &str, flags: Flags) -> Result<()> {
    assert_ne!(warning, Warning::All);

    #[allow(clippy::unwrap_used)]
    let mut warning_state_map = WARNING_STATE_MAP.lock().unwrap();

    let state = warning_state_map
        .entry(warning)
        .or_insert_with(State::empty);

    if context.opts.deny.contains(&Warning::All) || context.opts.deny.contains(&warning) {
        bail!(msg.to_owned());
    }

    if context.opts.quiet
        || context.opts.allow.contains(&Warning::All)
        || context.opts.allow.contains(&warning)
        || (flags.contains(Flags::ONCE) && state.contains(State::WARNING_EMITTED))
    {
        return Ok(());
    }

    let allow_msg = if state.contains(State::ALLOW_MSG_EMITTED) {
        String::new()
    } else {
        state.insert(State::ALLOW_MSG_EMITTED);
        format!(
            "
Silence this warning with: --allow {warning}"
        )
    };

    (context.println)(&format!(
        "{}: {}{}",
        if stdout().is_terminal() {
            Yellow.bold()
        } else {
            Style::default()
        }
        .paint("Warning"),
        msg,
        allow_msg
    ));

    state.insert(State::WARNING_EMITTED);

    Ok(())
}

pub fn note(context: &LightContext, msg: &str) {
    if context.opts.quiet {
        return;
    }

    (context.println)(&format!(
        "{}: {}",
        if stdout().is_terminal() {
            Green.bold()
        } else {
            Style::default()
        }
        .paint("Note"),
        msg
    ));
}
