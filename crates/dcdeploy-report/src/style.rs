use std::fmt::Display;
use std::io::{self, IsTerminal};

use console::Style;

use crate::options::ColorChoice;

const LABEL_WIDTH: usize = 20;

/// Kind of line in a rendered report; picks both the symbol and the color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mark {
    Add,
    Change,
    Remove,
    Warn,
    Noop,
}

impl Mark {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Change => "~",
            Self::Remove => "-",
            Self::Warn => "!",
            Self::Noop => "=",
        }
    }

    fn style(self) -> Style {
        match self {
            Self::Add => Style::new().green(),
            Self::Change => Style::new().cyan(),
            Self::Remove => Style::new().red(),
            Self::Warn => Style::new().yellow(),
            Self::Noop => Style::new().dim(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TextStyle {
    color_enabled: bool,
}

impl TextStyle {
    pub(crate) fn new(choice: ColorChoice) -> Self {
        Self {
            color_enabled: should_color(choice),
        }
    }

    fn paint<T: Display>(self, style: &Style, text: T) -> String {
        if self.color_enabled {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    pub(crate) fn pad_label(painted: &str) -> String {
        let visible_len = console::measure_text_width(painted);
        if visible_len < LABEL_WIDTH {
            format!("{painted}{}", " ".repeat(LABEL_WIDTH - visible_len))
        } else {
            format!("{painted} ")
        }
    }

    pub(crate) fn symbol(self, mark: Mark) -> String {
        let style = if mark == Mark::Noop {
            mark.style()
        } else {
            mark.style().bold()
        };
        self.paint(&style, mark.symbol())
    }

    pub(crate) fn label(self, mark: Mark, text: &str) -> String {
        self.paint(&mark.style(), text)
    }

    pub(crate) fn primary(self, text: &str) -> String {
        self.paint(&Style::new().white(), text)
    }

    pub(crate) fn dim(self, text: &str) -> String {
        self.paint(&Style::new().dim(), text)
    }

    pub(crate) fn header_command(self, text: &str) -> String {
        self.paint(&Style::new().white().bold(), text)
    }

    pub(crate) fn warn_prefix(self, text: &str) -> String {
        self.paint(&Style::new().yellow().bold(), text)
    }

    pub(crate) fn error_prefix(self, text: &str) -> String {
        self.paint(&Style::new().red().bold(), text)
    }

    pub(crate) fn bold(self, text: &str) -> String {
        self.paint(&Style::new().white().bold(), text)
    }
}

fn should_color(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stdout().is_terminal(),
    }
}
