//! Typed filter graph.
//!
//! A graph starts empty, grows as a simple chain while every stage is a
//! plain one-in/one-out filter, and is promoted to labeled form the first
//! time a stage needs explicit ports (a split, an extra input, a source
//! filter). The accumulated simple chain becomes the first labeled chain,
//! fed by the main input stream.
//!
//! The graph always tracks a *head*: the pad carrying the current main
//! video stream. Simple stages are appended at the head; labeled stages
//! take the head, wire it explicitly, and set a new one.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Label used for the terminal output when the graph has no labeled head.
pub const TERMINAL_LABEL: &str = "vout";

/// Errors found while wiring or validating a graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("label [{label}] is consumed before it is produced")]
    DanglingLabel { label: String },

    #[error("label [{label}] is consumed more than once")]
    ReusedLabel { label: String },

    #[error("label [{label}] is produced more than once")]
    DuplicateLabel { label: String },

    #[error("label [{label}] is produced but never consumed")]
    UnconsumedLabel { label: String },

    #[error("stream {index}:v refers to an input that was never added")]
    MissingInput { index: usize },

    #[error("chain {index} has no filters")]
    EmptyChain { index: usize },

    #[error("chain {index} has no output label")]
    UnlabeledChain { index: usize },

    #[error("graph has no terminal output")]
    NoOutput,
}

/// A single filter invocation: `name=arg1:arg2:...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    name: String,
    args: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: vec![],
        }
    }

    /// A preformatted fragment (possibly several comma-joined filters).
    pub fn raw(fragment: impl Into<String>) -> Self {
        Self::new(fragment)
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Append a `key=value` argument.
    pub fn opt(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.args.push(format!("{key}={value}"));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.args.is_empty() {
            write!(f, "={}", self.args.join(":"))?;
        }
        Ok(())
    }
}

/// A named link between two chains. Only the graph mints labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// A chain input: an engine input stream or a label from an earlier chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pad {
    /// Video stream of engine input `n` (0 is the main source).
    Stream(usize),
    Label(Label),
}

impl Pad {
    pub fn main() -> Self {
        Pad::Stream(0)
    }
}

impl From<Label> for Pad {
    fn from(label: Label) -> Self {
        Pad::Label(label)
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pad::Stream(index) => write!(f, "[{index}:v]"),
            Pad::Label(label) => label.fmt(f),
        }
    }
}

/// One `;`-separated chain of a labeled graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub inputs: Vec<Pad>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<Label>,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pad in &self.inputs {
            pad.fmt(f)?;
        }
        let filters: Vec<String> = self.filters.iter().map(ToString::to_string).collect();
        f.write_str(&filters.join(","))?;
        for label in &self.outputs {
            label.fmt(f)?;
        }
        Ok(())
    }
}

/// An extra engine input bound at invocation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphInput {
    pub path: PathBuf,
    /// Loop the input forever (still images) so it lasts as long as the main stream.
    pub looped: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Empty,
    Simple(Vec<Filter>),
    Labeled {
        chains: Vec<Chain>,
        head: Option<Pad>,
    },
}

/// Incrementally built filter graph.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    mode: Mode,
    inputs: Vec<GraphInput>,
    next_label: usize,
}

impl Default for FilterGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterGraph {
    pub fn new() -> Self {
        Self {
            mode: Mode::Empty,
            inputs: vec![],
            next_label: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.mode, Mode::Empty)
    }

    pub fn is_labeled(&self) -> bool {
        matches!(self.mode, Mode::Labeled { .. })
    }

    /// Labeled chains so far (empty before promotion).
    pub fn chains(&self) -> &[Chain] {
        match &self.mode {
            Mode::Labeled { chains, .. } => chains,
            _ => &[],
        }
    }

    /// Number of filters accumulated while still in simple form.
    pub fn simple_len(&self) -> usize {
        match &self.mode {
            Mode::Simple(filters) => filters.len(),
            _ => 0,
        }
    }

    pub fn inputs(&self) -> &[GraphInput] {
        &self.inputs
    }

    /// Mint a label that no other chain uses.
    pub fn fresh(&mut self, prefix: &str) -> Label {
        let label = Label(format!("{prefix}{}", self.next_label));
        self.next_label += 1;
        label
    }

    /// Register an extra input; returns its engine input index.
    pub fn add_input(&mut self, path: impl Into<PathBuf>, looped: bool) -> usize {
        self.inputs.push(GraphInput {
            path: path.into(),
            looped,
        });
        self.inputs.len()
    }

    /// Append a one-in/one-out filter at the head.
    pub fn push(&mut self, filter: Filter) -> Result<(), GraphError> {
        match &mut self.mode {
            Mode::Empty => {
                self.mode = Mode::Simple(vec![filter]);
                Ok(())
            }
            Mode::Simple(filters) => {
                filters.push(filter);
                Ok(())
            }
            Mode::Labeled { chains, head } => {
                let pad = head.take().ok_or(GraphError::NoOutput)?;
                if let Some(last) = open_tail(chains, &pad) {
                    last.filters.push(filter);
                    *head = Some(pad);
                    return Ok(());
                }
                let label = Label(format!("v{}", self.next_label));
                self.next_label += 1;
                chains.push(Chain {
                    inputs: vec![pad],
                    filters: vec![filter],
                    outputs: vec![label.clone()],
                });
                *head = Some(Pad::Label(label));
                Ok(())
            }
        }
    }

    /// Append several filters at the head.
    pub fn extend(&mut self, filters: impl IntoIterator<Item = Filter>) -> Result<(), GraphError> {
        for filter in filters {
            self.push(filter)?;
        }
        Ok(())
    }

    /// Split the head into one branch per prefix. The head is consumed.
    ///
    /// When the head is the sole output of the last chain the split is
    /// appended to that chain instead of opening a new one.
    pub fn split(&mut self, prefixes: &[&str]) -> Result<Vec<Label>, GraphError> {
        self.promote();
        let labels: Vec<Label> = prefixes.iter().map(|p| self.fresh(p)).collect();
        let split = Filter::new("split").arg(labels.len());

        let Mode::Labeled { chains, head } = &mut self.mode else {
            return Err(GraphError::NoOutput);
        };
        let pad = head.take().ok_or(GraphError::NoOutput)?;
        match open_tail(chains, &pad) {
            Some(last) => {
                last.filters.push(split);
                last.outputs = labels.clone();
            }
            None => chains.push(Chain {
                inputs: vec![pad],
                filters: vec![split],
                outputs: labels.clone(),
            }),
        }
        Ok(labels)
    }

    /// Detach the head so it can be wired into a labeled stage.
    ///
    /// Promotes a simple graph to labeled form; an empty graph yields the
    /// main input stream. The caller must install a new head with
    /// [`set_head`](Self::set_head) before pushing more simple filters.
    pub fn take_head(&mut self) -> Result<Pad, GraphError> {
        self.promote();
        match &mut self.mode {
            Mode::Labeled { head, .. } => head.take().ok_or(GraphError::NoOutput),
            _ => Err(GraphError::NoOutput),
        }
    }

    /// Install the pad carrying the main stream.
    pub fn set_head(&mut self, pad: impl Into<Pad>) {
        self.promote();
        if let Mode::Labeled { head, .. } = &mut self.mode {
            *head = Some(pad.into());
        }
    }

    /// Add a labeled chain with a single fresh output. The head is untouched.
    pub fn add_chain(&mut self, inputs: Vec<Pad>, filters: Vec<Filter>, prefix: &str) -> Label {
        self.promote();
        let label = self.fresh(prefix);
        if let Mode::Labeled { chains, .. } = &mut self.mode {
            chains.push(Chain {
                inputs,
                filters,
                outputs: vec![label.clone()],
            });
        }
        label
    }

    /// Check label closure: every consumed label is produced by an earlier
    /// chain, consumed exactly once, and only the head is left dangling.
    pub fn validate(&self) -> Result<(), GraphError> {
        let Mode::Labeled { chains, head } = &self.mode else {
            return Ok(());
        };

        let mut consumed: BTreeMap<&str, bool> = BTreeMap::new();
        for (index, chain) in chains.iter().enumerate() {
            if chain.filters.is_empty() {
                return Err(GraphError::EmptyChain { index });
            }
            if chain.outputs.is_empty() {
                return Err(GraphError::UnlabeledChain { index });
            }
            for pad in &chain.inputs {
                match pad {
                    Pad::Stream(i) if *i > self.inputs.len() => {
                        return Err(GraphError::MissingInput { index: *i });
                    }
                    Pad::Stream(_) => {}
                    Pad::Label(label) => match consumed.get_mut(label.as_str()) {
                        None => {
                            return Err(GraphError::DanglingLabel {
                                label: label.0.clone(),
                            })
                        }
                        Some(true) => {
                            return Err(GraphError::ReusedLabel {
                                label: label.0.clone(),
                            })
                        }
                        Some(used) => *used = true,
                    },
                }
            }
            for label in &chain.outputs {
                if consumed.insert(label.as_str(), false).is_some() {
                    return Err(GraphError::DuplicateLabel {
                        label: label.0.clone(),
                    });
                }
            }
        }

        let terminal = match head {
            None => return Err(GraphError::NoOutput),
            Some(Pad::Stream(i)) if *i > self.inputs.len() => {
                return Err(GraphError::MissingInput { index: *i });
            }
            Some(Pad::Stream(_)) => None,
            Some(Pad::Label(label)) => {
                match consumed.get(label.as_str()) {
                    None => {
                        return Err(GraphError::DanglingLabel {
                            label: label.0.clone(),
                        })
                    }
                    Some(true) => {
                        return Err(GraphError::ReusedLabel {
                            label: label.0.clone(),
                        })
                    }
                    Some(false) => {}
                }
                Some(label.as_str())
            }
        };

        for (label, used) in consumed {
            if !used && Some(label) != terminal {
                return Err(GraphError::UnconsumedLabel {
                    label: label.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validate and serialize to the engine's textual graph syntax.
    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        self.validate()?;
        let terminal = Label(TERMINAL_LABEL.to_string());

        let (text, output) = match &self.mode {
            Mode::Empty => (format!("{}null{terminal}", Pad::main()), terminal),
            Mode::Simple(filters) => {
                let chain = Chain {
                    inputs: vec![Pad::main()],
                    filters: filters.clone(),
                    outputs: vec![terminal.clone()],
                };
                (chain.to_string(), terminal)
            }
            Mode::Labeled { chains, head } => {
                let mut parts: Vec<String> = chains.iter().map(ToString::to_string).collect();
                let output = match head {
                    Some(Pad::Label(label)) => label.clone(),
                    Some(pad) => {
                        parts.push(format!("{pad}null{terminal}"));
                        terminal
                    }
                    None => return Err(GraphError::NoOutput),
                };
                (parts.join(";"), output)
            }
        };

        Ok(CompiledGraph {
            text,
            output,
            inputs: self.inputs.clone(),
        })
    }

    fn promote(&mut self) {
        match &mut self.mode {
            Mode::Empty => {
                self.mode = Mode::Labeled {
                    chains: vec![],
                    head: Some(Pad::main()),
                };
            }
            Mode::Simple(filters) => {
                let filters = std::mem::take(filters);
                let label = self.fresh("v");
                self.mode = Mode::Labeled {
                    chains: vec![Chain {
                        inputs: vec![Pad::main()],
                        filters,
                        outputs: vec![label.clone()],
                    }],
                    head: Some(Pad::Label(label)),
                };
            }
            Mode::Labeled { .. } => {}
        }
    }
}

/// The last chain, when `pad` is its sole output and can be extended in place.
fn open_tail<'a>(chains: &'a mut [Chain], pad: &Pad) -> Option<&'a mut Chain> {
    let Pad::Label(label) = pad else {
        return None;
    };
    chains
        .last_mut()
        .filter(|last| last.outputs.len() == 1 && &last.outputs[0] == label)
}

/// Serialized graph ready for an engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    /// `-filter_complex` argument.
    pub text: String,
    /// Terminal label to map into the output.
    pub output: Label,
    /// Extra inputs, in engine input order starting at index 1.
    pub inputs: Vec<GraphInput>,
}

impl CompiledGraph {
    /// `-map` argument for the video output.
    pub fn map_arg(&self) -> String {
        self.output.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hflip() -> Filter {
        Filter::new("hflip")
    }

    #[test]
    fn test_filter_display() {
        let f = Filter::new("scale").arg(1080).arg(1920).opt("flags", "bilinear");
        assert_eq!(f.to_string(), "scale=1080:1920:flags=bilinear");
        assert_eq!(hflip().to_string(), "hflip");
    }

    #[test]
    fn test_empty_graph_compiles_to_passthrough() {
        let compiled = FilterGraph::new().compile().unwrap();
        assert_eq!(compiled.text, "[0:v]null[vout]");
        assert_eq!(compiled.map_arg(), "[vout]");
    }

    #[test]
    fn test_simple_chain_compiles_with_terminal_label() {
        let mut graph = FilterGraph::new();
        graph.push(Filter::new("setpts").arg("0.5*PTS")).unwrap();
        graph.push(hflip()).unwrap();
        assert!(!graph.is_labeled());
        assert_eq!(graph.simple_len(), 2);

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.text, "[0:v]setpts=0.5*PTS,hflip[vout]");
    }

    #[test]
    fn test_promotion_from_simple_rewraps_chain() {
        let mut graph = FilterGraph::new();
        graph.push(hflip()).unwrap();
        let branches = graph.split(&["bg", "fg"]).unwrap();
        assert!(graph.is_labeled());
        assert_eq!(graph.chains().len(), 1);
        assert_eq!(graph.chains()[0].inputs, vec![Pad::main()]);
        assert_eq!(
            graph.chains()[0].to_string(),
            format!("[0:v]hflip,split=2{}{}", branches[0], branches[1])
        );
    }

    #[test]
    fn test_promotion_from_empty_uses_main_stream() {
        let mut graph = FilterGraph::new();
        let head = graph.take_head().unwrap();
        assert_eq!(head, Pad::main());
        assert!(graph.is_labeled());
        assert!(graph.chains().is_empty());

        let out = graph.add_chain(vec![head], vec![hflip()], "m");
        graph.set_head(out.clone());
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.text, format!("[0:v]hflip{out}"));
        assert_eq!(compiled.output, out);
    }

    #[test]
    fn test_push_after_labeled_extends_tail_chain() {
        let mut graph = FilterGraph::new();
        let head = graph.take_head().unwrap();
        let out = graph.add_chain(vec![head], vec![hflip()], "m");
        graph.set_head(out);
        graph.push(Filter::new("setsar").arg(1)).unwrap();
        assert_eq!(graph.chains().len(), 1);
        assert!(graph.chains()[0].to_string().contains("hflip,setsar=1"));
    }

    #[test]
    fn test_push_on_non_tail_head_opens_new_chain() {
        let mut graph = FilterGraph::new();
        let bg = graph.add_chain(vec![], vec![Filter::raw("color=c=black:s=8x8")], "bg");
        let head = graph.take_head().unwrap();
        let fg = graph.add_chain(vec![head], vec![hflip()], "fg");
        let joined = graph.add_chain(
            vec![bg.into(), fg.into()],
            vec![Filter::new("overlay")],
            "main",
        );
        graph.set_head(Pad::Stream(0));
        // Head points at a stream, not at the tail chain.
        assert!(graph.push(hflip()).is_ok());
        assert_eq!(graph.chains().len(), 4);
        // `main` is now unconsumed.
        assert_eq!(
            graph.validate(),
            Err(GraphError::UnconsumedLabel {
                label: joined.as_str().to_string()
            })
        );
    }

    #[test]
    fn test_validate_rejects_dangling_and_reused() {
        let mut graph = FilterGraph::new();
        let labels = graph.split(&["a", "b"]).unwrap();
        let (a, b) = (labels[0].clone(), labels[1].clone());
        let joined = graph.add_chain(
            vec![a.clone().into(), b.clone().into()],
            vec![Filter::new("overlay")],
            "o",
        );
        graph.set_head(joined);
        assert!(graph.validate().is_ok());

        let dup = graph.add_chain(vec![a.clone().into()], vec![hflip()], "x");
        graph.set_head(dup);
        assert_eq!(
            graph.validate(),
            Err(GraphError::ReusedLabel {
                label: a.as_str().to_string()
            })
        );
    }

    #[test]
    fn test_validate_rejects_forward_reference() {
        let mut graph = FilterGraph::new();
        let ghost = graph.fresh("ghost");
        let head = graph.take_head().unwrap();
        let out = graph.add_chain(
            vec![head, ghost.clone().into()],
            vec![Filter::new("overlay")],
            "o",
        );
        graph.set_head(out);
        assert_eq!(
            graph.validate(),
            Err(GraphError::DanglingLabel {
                label: ghost.as_str().to_string()
            })
        );
    }

    #[test]
    fn test_validate_rejects_missing_input() {
        let mut graph = FilterGraph::new();
        let head = graph.take_head().unwrap();
        let out = graph.add_chain(vec![head, Pad::Stream(1)], vec![Filter::new("overlay")], "o");
        graph.set_head(out);
        assert_eq!(graph.validate(), Err(GraphError::MissingInput { index: 1 }));

        graph.add_input("logo.png", true);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_consumed_head_has_no_output() {
        let mut graph = FilterGraph::new();
        graph.take_head().unwrap();
        assert_eq!(graph.compile(), Err(GraphError::NoOutput));
        assert_eq!(graph.push(hflip()), Err(GraphError::NoOutput));
    }

    #[test]
    fn test_fresh_labels_never_collide() {
        let mut graph = FilterGraph::new();
        let a = graph.fresh("stk");
        let b = graph.fresh("stk");
        assert_ne!(a, b);
    }
}
