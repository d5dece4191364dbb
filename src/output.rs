//! Entity output connections ("signals").
//!
//! Stored in a `connections` block as `"OnTrigger" "target,Input,params,delay,times"`.
//! Newer files separate fields with ESC (`\x1b`) instead of commas so params may
//! contain commas. Either side may cross an instance boundary:
//! `"instance:relay;OnTrigger"` on the key, `"instance:relay;Trigger"` as the input.

use crate::frame::{format_float, parse_float};

const INSTANCE_MARKER: &str = "instance:";
const ESC_SEP: char = '\u{1b}';

#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub output: String,
    pub target: String,
    pub input: String,
    pub params: String,
    pub delay: f64,
    /// Remaining fire count, `-1` for unlimited.
    pub times: i32,
    pub comma_sep: bool,
    /// Boundary name on the receiving side (`instance:<name>;<input>`).
    pub inst_in: Option<String>,
    /// Boundary name on the firing side (`instance:<name>;<output>`).
    pub inst_out: Option<String>,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            output: String::new(),
            target: String::new(),
            input: String::new(),
            params: String::new(),
            delay: 0.0,
            times: -1,
            comma_sep: false,
            inst_in: None,
            inst_out: None,
        }
    }
}

fn split_instance_marker(text: &str) -> (Option<String>, String) {
    let is_marked = text
        .get(..INSTANCE_MARKER.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(INSTANCE_MARKER));
    if is_marked {
        let rest = &text[INSTANCE_MARKER.len()..];
        if let Some((name, action)) = rest.split_once(';') {
            return (Some(name.to_string()), action.to_string());
        }
    }
    (None, text.to_string())
}

/// Fire counts combine to the stricter one; `-1` means no limit.
pub fn combine_times(first: i32, second: i32) -> i32 {
    match (first < 0, second < 0) {
        (true, _) => second,
        (_, true) => first,
        _ => first.min(second),
    }
}

impl Output {
    pub fn new(output: &str, target: &str, input: &str) -> Self {
        Output {
            output: output.to_string(),
            target: target.to_string(),
            input: input.to_string(),
            ..Default::default()
        }
    }

    /// Parse one `connections` pair. Returns `None` for values with too few fields.
    pub fn parse(key: &str, value: &str) -> Option<Output> {
        let (sep, comma_sep) = if value.contains(ESC_SEP) {
            (ESC_SEP, false)
        } else {
            (',', true)
        };
        let parts: Vec<&str> = value.split(sep).collect();
        if parts.len() < 5 {
            return None;
        }
        let n = parts.len();
        let (inst_out, output) = split_instance_marker(key);
        let (inst_in, input) = split_instance_marker(parts[1]);

        Some(Output {
            output,
            target: parts[0].to_string(),
            input,
            params: parts[2..n - 2].join(&sep.to_string()),
            delay: parse_float(parts[n - 2]),
            times: parts[n - 1].trim().parse().unwrap_or(-1),
            comma_sep,
            inst_in,
            inst_out,
        })
    }

    pub fn key(&self) -> String {
        match &self.inst_out {
            Some(name) => format!("{}{};{}", INSTANCE_MARKER, name, self.output),
            None => self.output.clone(),
        }
    }

    pub fn value(&self) -> String {
        let sep = if self.comma_sep { ',' } else { ESC_SEP };
        let input = match &self.inst_in {
            Some(name) => format!("{}{};{}", INSTANCE_MARKER, name, self.input),
            None => self.input.clone(),
        };
        [
            self.target.clone(),
            input,
            self.params.clone(),
            format_float(self.delay),
            self.times.to_string(),
        ]
        .join(&sep.to_string())
    }

    /// Redirect this signal through a proxy relay, in place. The relay's own
    /// parameters win only when it declares some.
    pub fn reroute(&mut self, relay: &Output, target: String) {
        self.target = target;
        self.input = relay.input.clone();
        self.inst_in = None;
        if !relay.params.is_empty() {
            self.params = relay.params.clone();
        }
        self.times = combine_times(self.times, relay.times);
        self.delay += relay.delay;
        self.comma_sep = self.comma_sep && relay.comma_sep;
    }

    /// Join a reaction declared inside an instance with the signal attached from
    /// outside: fires on `inner`'s output, delivers to `outer`'s target.
    pub fn combine(inner: &Output, outer: &Output) -> Output {
        Output {
            output: inner.output.clone(),
            target: outer.target.clone(),
            input: outer.input.clone(),
            params: if outer.params.is_empty() {
                inner.params.clone()
            } else {
                outer.params.clone()
            },
            delay: inner.delay + outer.delay,
            times: combine_times(inner.times, outer.times),
            comma_sep: inner.comma_sep && outer.comma_sep,
            inst_in: outer.inst_in.clone(),
            inst_out: inner.inst_out.clone(),
        }
    }
}
