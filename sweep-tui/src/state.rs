//! View state for the live renderer.
//!
//! All mutation happens on the event loop task; the drainer tasks only
//! feed events in. Repo panes live in input order and are never
//! reordered.

use crate::event::{Event, Queue};

/// Per-repo lifecycle: waiting → active → done (ok | failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoStatus {
    Waiting,
    Active,
    Done,
    Failed,
}

impl RepoStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            RepoStatus::Waiting => "·",
            RepoStatus::Active => "⧖",
            RepoStatus::Done => "✓",
            RepoStatus::Failed => "✗",
        }
    }
}

/// One repo's accumulated output and lifecycle flags.
pub struct RepoPane {
    pub name: String,
    pub output: Vec<u8>,
    pub errors: Vec<String>,
    pub status: RepoStatus,
    out_closed: bool,
    err_closed: bool,
}

impl RepoPane {
    fn new(name: String) -> Self {
        Self {
            name,
            output: Vec::new(),
            errors: Vec::new(),
            status: RepoStatus::Waiting,
            out_closed: false,
            err_closed: false,
        }
    }

    fn complete_if_drained(&mut self) {
        if self.out_closed && self.err_closed {
            self.status = if self.errors.is_empty() {
                RepoStatus::Done
            } else {
                RepoStatus::Failed
            };
        }
    }
}

/// A renderable line of the content area.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentLine {
    Header { name: String, status: RepoStatus },
    Text(String),
    Error(String),
}

pub struct View {
    pub panes: Vec<RepoPane>,
    pub scroll: usize,
    /// Content-area height from the last draw, for page scrolling and
    /// scroll clamping.
    pub viewport_height: usize,
    pub started: chrono::DateTime<chrono::Utc>,
}

impl View {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            panes: names.into_iter().map(RepoPane::new).collect(),
            scroll: 0,
            viewport_height: 20,
            started: chrono::Utc::now(),
        }
    }

    /// Fold one channel event into the view. The first output event flips
    /// a waiting repo to active, even a zero-length start signal.
    pub fn apply(&mut self, event: Event) {
        match event {
            Event::Output { index, chunk } => {
                if let Some(pane) = self.panes.get_mut(index) {
                    if pane.status == RepoStatus::Waiting {
                        pane.status = RepoStatus::Active;
                    }
                    pane.output.extend_from_slice(&chunk);
                }
            }
            Event::Error { index, message } => {
                if let Some(pane) = self.panes.get_mut(index) {
                    if pane.status == RepoStatus::Waiting {
                        pane.status = RepoStatus::Active;
                    }
                    pane.errors.push(message);
                }
            }
            Event::Closed { index, queue } => {
                if let Some(pane) = self.panes.get_mut(index) {
                    match queue {
                        Queue::Output => pane.out_closed = true,
                        Queue::Errors => pane.err_closed = true,
                    }
                    pane.complete_if_drained();
                }
            }
            Event::Key(_) | Event::Resize => {}
        }
    }

    pub fn all_done(&self) -> bool {
        self.panes
            .iter()
            .all(|p| matches!(p.status, RepoStatus::Done | RepoStatus::Failed))
    }

    /// `(succeeded, failed, total)`.
    pub fn counts(&self) -> (usize, usize, usize) {
        let succeeded = self
            .panes
            .iter()
            .filter(|p| p.status == RepoStatus::Done)
            .count();
        let failed = self
            .panes
            .iter()
            .filter(|p| p.status == RepoStatus::Failed)
            .count();
        (succeeded, failed, self.panes.len())
    }

    /// Flatten every pane into content lines, in input order. This is the
    /// one content builder: the live viewport styles these lines and the
    /// post-run print writes them plain.
    pub fn content_lines(&self) -> Vec<ContentLine> {
        let mut lines = Vec::new();
        for pane in &self.panes {
            lines.push(ContentLine::Header {
                name: pane.name.clone(),
                status: pane.status,
            });
            let text = String::from_utf8_lossy(&pane.output);
            for line in text.split('\n') {
                lines.push(ContentLine::Text(line.to_string()));
            }
            // split() yields a trailing empty element after a final
            // newline; keep the output compact.
            if text.is_empty() || text.ends_with('\n') {
                lines.pop();
            }
            for error in &pane.errors {
                lines.push(ContentLine::Error(format!("ERROR: {error}")));
            }
        }
        lines
    }

    /// Plain-text form of the full log, for `p` and `print_results`.
    pub fn render_plain(&self) -> String {
        let mut out = String::new();
        for line in self.content_lines() {
            match line {
                ContentLine::Header { name, .. } => {
                    out.push_str(&format!("=== {name} ===\n"));
                }
                ContentLine::Text(text) => {
                    out.push_str(&text);
                    out.push('\n');
                }
                ContentLine::Error(text) => {
                    out.push_str(&text);
                    out.push('\n');
                }
            }
        }
        out
    }

    // ── Scrolling ────────────────────────────────────────────────────────

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll = (self.scroll + lines).min(self.max_scroll());
    }

    pub fn scroll_home(&mut self) {
        self.scroll = 0;
    }

    pub fn scroll_end(&mut self) {
        self.scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> usize {
        self.content_lines()
            .len()
            .saturating_sub(self.viewport_height)
    }
}

/// Proportional widths for the success / failure / incomplete segments of
/// the progress bar. Rounding remainders land on the incomplete segment.
pub fn segment_widths(
    width: usize,
    succeeded: usize,
    failed: usize,
    total: usize,
) -> (usize, usize, usize) {
    if total == 0 || width == 0 {
        return (0, 0, width);
    }
    let success_width = width * succeeded / total;
    let failure_width = width * failed / total;
    let incomplete = width - success_width - failure_width;
    (success_width, failure_width, incomplete)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(names: &[&str]) -> View {
        View::new(names.iter().map(|s| s.to_string()).collect())
    }

    fn close_both(view: &mut View, index: usize) {
        view.apply(Event::Closed {
            index,
            queue: Queue::Output,
        });
        view.apply(Event::Closed {
            index,
            queue: Queue::Errors,
        });
    }

    #[test]
    fn start_signal_flips_waiting_to_active() {
        let mut v = view(&["r1"]);
        assert_eq!(v.panes[0].status, RepoStatus::Waiting);
        v.apply(Event::Output {
            index: 0,
            chunk: Vec::new(),
        });
        assert_eq!(v.panes[0].status, RepoStatus::Active);
        assert!(v.panes[0].output.is_empty());
    }

    #[test]
    fn completion_requires_both_queues_closed() {
        let mut v = view(&["r1"]);
        v.apply(Event::Closed {
            index: 0,
            queue: Queue::Output,
        });
        assert_ne!(v.panes[0].status, RepoStatus::Done);
        v.apply(Event::Closed {
            index: 0,
            queue: Queue::Errors,
        });
        assert_eq!(v.panes[0].status, RepoStatus::Done);
    }

    #[test]
    fn errors_at_completion_mean_failure() {
        let mut v = view(&["r1"]);
        v.apply(Event::Error {
            index: 0,
            message: "boom".to_string(),
        });
        close_both(&mut v, 0);
        assert_eq!(v.panes[0].status, RepoStatus::Failed);
        let (succeeded, failed, total) = v.counts();
        assert_eq!((succeeded, failed, total), (0, 1, 1));
    }

    #[test]
    fn all_done_tracks_every_pane() {
        let mut v = view(&["r1", "r2"]);
        close_both(&mut v, 0);
        assert!(!v.all_done());
        close_both(&mut v, 1);
        assert!(v.all_done());
    }

    #[test]
    fn content_lines_keep_input_order() {
        let mut v = view(&["r1", "r2"]);
        v.apply(Event::Output {
            index: 1,
            chunk: b"from r2\n".to_vec(),
        });
        v.apply(Event::Output {
            index: 0,
            chunk: b"from r1\n".to_vec(),
        });
        v.apply(Event::Error {
            index: 0,
            message: "oops".to_string(),
        });

        let lines = v.content_lines();
        assert_eq!(
            lines,
            vec![
                ContentLine::Header {
                    name: "r1".to_string(),
                    status: RepoStatus::Active
                },
                ContentLine::Text("from r1".to_string()),
                ContentLine::Error("ERROR: oops".to_string()),
                ContentLine::Header {
                    name: "r2".to_string(),
                    status: RepoStatus::Active
                },
                ContentLine::Text("from r2".to_string()),
            ]
        );
    }

    #[test]
    fn chunks_reassemble_across_line_boundaries() {
        let mut v = view(&["r1"]);
        v.apply(Event::Output {
            index: 0,
            chunk: b"hel".to_vec(),
        });
        v.apply(Event::Output {
            index: 0,
            chunk: b"lo\nwo".to_vec(),
        });
        v.apply(Event::Output {
            index: 0,
            chunk: b"rld".to_vec(),
        });
        let lines = v.content_lines();
        assert_eq!(lines[1], ContentLine::Text("hello".to_string()));
        assert_eq!(lines[2], ContentLine::Text("world".to_string()));
    }

    #[test]
    fn render_plain_matches_content_lines() {
        let mut v = view(&["r1"]);
        v.apply(Event::Output {
            index: 0,
            chunk: b"line\n".to_vec(),
        });
        v.apply(Event::Error {
            index: 0,
            message: "bad".to_string(),
        });
        assert_eq!(v.render_plain(), "=== r1 ===\nline\nERROR: bad\n");
    }

    #[test]
    fn scrolling_clamps_to_content() {
        let mut v = view(&["r1"]);
        v.viewport_height = 2;
        v.apply(Event::Output {
            index: 0,
            chunk: b"a\nb\nc\nd\n".to_vec(),
        });
        // 5 content lines (header + 4), viewport 2 → max scroll 3.
        v.scroll_down(100);
        assert_eq!(v.scroll, 3);
        v.scroll_up(1);
        assert_eq!(v.scroll, 2);
        v.scroll_home();
        assert_eq!(v.scroll, 0);
        v.scroll_end();
        assert_eq!(v.scroll, 3);
    }

    #[test]
    fn segment_widths_are_proportional() {
        assert_eq!(segment_widths(10, 5, 5, 10), (5, 5, 0));
        assert_eq!(segment_widths(10, 1, 1, 4), (2, 2, 6));
        assert_eq!(segment_widths(10, 0, 0, 4), (0, 0, 10));
        assert_eq!(segment_widths(10, 0, 0, 0), (0, 0, 10));
        // Remainders go to the incomplete segment.
        let (s, f, i) = segment_widths(10, 1, 1, 3);
        assert_eq!(s + f + i, 10);
    }
}
