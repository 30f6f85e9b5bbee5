//! Stack inference engine
//!
//! Simulates the data stack while a definition body is parsed. The stack
//! holds [`OutputRef`]s, never whole nodes. Popping an empty stack does not
//! fail: it synthesizes the next formal parameter, typed as the popping
//! operation requires. Parameters are therefore discovered in first-used
//! order, and argument 0 is the value on top of the caller's stack.

use crate::builtins::Primitive;
use crate::error::{CompileError, CompileResult};
use crate::graph::{Graph, NodeId, OutputRef};
use crate::types::ValueType;
use tracing::trace;

#[derive(Debug, Clone, Default)]
pub struct InferenceStack {
    stack: Vec<OutputRef>,
    arguments: Vec<NodeId>,
}

impl InferenceStack {
    pub fn new() -> Self {
        InferenceStack::default()
    }

    /// Reset for a new definition body
    pub fn clear(&mut self) {
        self.stack.clear();
        self.arguments.clear();
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Synthesized argument nodes, in argument order
    pub fn arguments(&self) -> &[NodeId] {
        &self.arguments
    }

    /// Stack contents, bottom-to-top
    pub fn contents(&self) -> &[OutputRef] {
        &self.stack
    }

    /// Push every output of `node`, in output-index order
    pub fn push(&mut self, graph: &Graph, node: NodeId) {
        for index in 0..graph.output_arity(node) {
            self.stack.push(OutputRef::new(node, index));
        }
    }

    pub fn push_ref(&mut self, output: OutputRef) {
        self.stack.push(output);
    }

    /// Pop one value that `word` requires to be of type `required`.
    ///
    /// `position` is the token index reported in a `TypeError`.
    pub fn pop(
        &mut self,
        graph: &mut Graph,
        required: ValueType,
        word: &str,
        position: usize,
    ) -> CompileResult<OutputRef> {
        let output = match self.stack.pop() {
            Some(output) => output,
            None => {
                let index = self.arguments.len();
                let node = graph.add_argument(index, required);
                trace!(word, index, ty = %required, "synthesized argument");
                self.arguments.push(node);
                OutputRef::new(node, 0)
            }
        };

        let actual = graph.output_type(output)?;
        if ValueType::compatible(required, actual) {
            return Ok(output);
        }

        // An argument first consumed polymorphically gets its type from the
        // first concrete use.
        if actual == ValueType::Any && required.is_concrete() {
            let origin = graph.origin(output);
            if graph.is_unbound_argument(origin.node) {
                graph.bind_argument(origin.node, required);
                return Ok(output);
            }
        }

        Err(CompileError::TypeError {
            word: word.to_string(),
            position,
            expected: required,
            actual,
        })
    }

    /// Splice a primitive node: operands are popped top-first and stored
    /// bottom-to-top, then every output is pushed.
    pub fn apply(
        &mut self,
        graph: &mut Graph,
        primitive: Primitive,
        position: usize,
    ) -> CompileResult<NodeId> {
        let arity = primitive.input_arity();
        let mut inputs = Vec::with_capacity(arity);
        for slot in (0..arity).rev() {
            let required = primitive.input_type(slot)?;
            inputs.push(self.pop(graph, required, primitive.name(), position)?);
        }
        inputs.reverse();
        let node = graph.add_primitive(primitive, inputs)?;
        self.push(graph, node);
        Ok(node)
    }

    /// Remove and return the residual stack (bottom-to-top) and the arguments
    pub fn finish(&mut self) -> (Vec<OutputRef>, Vec<NodeId>) {
        (
            std::mem::take(&mut self.stack),
            std::mem::take(&mut self.arguments),
        )
    }
}
