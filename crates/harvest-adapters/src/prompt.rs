use harvest_core::{Decision, DecisionProvider, Prompt};
use std::io::{self, BufRead, Write};

/// Asks on the console. End of input answers "no" from then on.
pub struct InteractiveDecisions<R, W> {
    input: R,
    output: W,
    closed: bool,
}

impl InteractiveDecisions<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> InteractiveDecisions<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            closed: false,
        }
    }
}

impl<R: BufRead, W: Write> DecisionProvider for InteractiveDecisions<R, W> {
    fn decide(&mut self, prompt: &Prompt) -> Decision {
        if self.closed {
            return Decision::No;
        }
        let choices = if prompt.allow_all { "(y/n/a)" } else { "(y/n)" };
        let _ = write!(self.output, "{} {}: ", prompt.message, choices);
        let _ = self.output.flush();

        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) | Err(_) => {
                self.closed = true;
                let _ = writeln!(self.output);
                Decision::No
            }
            Ok(_) => match Decision::from_answer(&answer) {
                Decision::All if !prompt.allow_all => Decision::Yes,
                decision => decision,
            },
        }
    }
}
