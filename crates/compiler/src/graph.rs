//! Expression node graph
//!
//! A definition body is compiled into a DAG of typed nodes stored in an
//! arena. Nodes refer to each other only through [`OutputRef`] handles into
//! the same arena, and an input always names a node created earlier, so the
//! arena order is a topological order.
//!
//! Code generation is deferred: a [`Compilation`] keeps one cache slot per
//! node, and each node runs its code-generation logic at most once no matter
//! how many consumers ask for its outputs. The two consumers of a `dup` see
//! the same backend value.

use crate::backend::Backend;
use crate::builtins::Primitive;
use crate::dictionary::WordId;
use crate::error::{CompileError, CompileResult};
use crate::types::{Signature, ValueType};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// Handle of a node inside its graph's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// One value produced by a node: the unit moved around the inference stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub node: NodeId,
    pub index: usize,
}

impl OutputRef {
    pub fn new(node: NodeId, index: usize) -> Self {
        OutputRef { node, index }
    }
}

/// Target of a call node. The signature is copied at construction so the
/// graph stays self-describing after the dictionary grows.
#[derive(Debug, Clone, PartialEq)]
pub struct CallTarget {
    pub word: WordId,
    pub name: String,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A constant; its type is fixed by the literal kind
    Literal(Value),
    /// The `index`-th formal parameter, typed as first required
    Argument { index: usize, declared: ValueType },
    /// A built-in operation; inputs are bottom-to-top
    Primitive(Primitive),
    /// Invocation of a compiled or extern word; inputs are in argument order
    Call(CallTarget),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub inputs: Vec<OutputRef>,
}

impl Node {
    pub fn input_arity(&self) -> usize {
        match &self.kind {
            NodeKind::Literal(_) | NodeKind::Argument { .. } => 0,
            NodeKind::Primitive(p) => p.input_arity(),
            NodeKind::Call(target) => target.signature.input_arity(),
        }
    }

    pub fn output_arity(&self) -> usize {
        match &self.kind {
            NodeKind::Literal(_) | NodeKind::Argument { .. } => 1,
            NodeKind::Primitive(p) => p.output_arity(),
            NodeKind::Call(target) => target.signature.output_arity(),
        }
    }

    /// Short label used in traces and error messages
    pub fn label(&self) -> String {
        match &self.kind {
            NodeKind::Literal(Value::Str(s)) => format!("{:?}", s),
            NodeKind::Literal(v) => v.to_string(),
            NodeKind::Argument { index, .. } => format!("arg{}", index),
            NodeKind::Primitive(p) => p.name().to_string(),
            NodeKind::Call(target) => target.name.clone(),
        }
    }
}

/// Arena of expression nodes for one definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
    /// Concrete types fixed for `Any` arguments by a later use
    bindings: HashMap<NodeId, ValueType>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Node ids in creation order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    fn push(&mut self, kind: NodeKind, inputs: Vec<OutputRef>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind, inputs });
        id
    }

    pub fn add_literal(&mut self, value: Value) -> NodeId {
        self.push(NodeKind::Literal(value), Vec::new())
    }

    pub fn add_argument(&mut self, index: usize, declared: ValueType) -> NodeId {
        self.push(NodeKind::Argument { index, declared }, Vec::new())
    }

    pub fn add_primitive(
        &mut self,
        primitive: Primitive,
        inputs: Vec<OutputRef>,
    ) -> CompileResult<NodeId> {
        if inputs.len() != primitive.input_arity() {
            return Err(CompileError::ArityError {
                word: primitive.name().to_string(),
                reason: format!(
                    "given {} input(s), takes {}",
                    inputs.len(),
                    primitive.input_arity()
                ),
            });
        }
        Ok(self.push(NodeKind::Primitive(primitive), inputs))
    }

    pub fn add_call(
        &mut self,
        target: CallTarget,
        inputs: Vec<OutputRef>,
    ) -> CompileResult<NodeId> {
        let declared = target.signature.input_arity();
        if inputs.len() != declared {
            return Err(CompileError::ArityError {
                word: target.name.clone(),
                reason: format!(
                    "call requested {} input(s), callee declares {}",
                    inputs.len(),
                    declared
                ),
            });
        }
        Ok(self.push(NodeKind::Call(target), inputs))
    }

    pub fn input_arity(&self, id: NodeId) -> usize {
        self.node(id).input_arity()
    }

    pub fn output_arity(&self, id: NodeId) -> usize {
        self.node(id).output_arity()
    }

    /// The type a node requires for its `index`-th input
    pub fn input_type(&self, id: NodeId, index: usize) -> CompileResult<ValueType> {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Literal(_) | NodeKind::Argument { .. } => Err(CompileError::InvalidInput {
                node: node.label(),
            }),
            NodeKind::Primitive(p) => p.input_type(index),
            NodeKind::Call(target) => {
                target
                    .signature
                    .inputs
                    .get(index)
                    .copied()
                    .ok_or(CompileError::IndexError {
                        index,
                        arity: target.signature.input_arity(),
                    })
            }
        }
    }

    /// Follow stack shufflers back to the node that really produces a value
    pub fn origin(&self, mut output: OutputRef) -> OutputRef {
        loop {
            let node = self.node(output.node);
            match &node.kind {
                NodeKind::Primitive(p) => match p.shuffle() {
                    Some(map) if output.index < map.len() => {
                        output = node.inputs[map[output.index]];
                    }
                    _ => return output,
                },
                _ => return output,
            }
        }
    }

    /// Type of one output, after argument bindings.
    ///
    /// Constant time in the size of the graph: shufflers are skipped by
    /// `origin`, and every other producer has a fixed output type.
    pub fn output_type(&self, output: OutputRef) -> CompileResult<ValueType> {
        let arity = self.output_arity(output.node);
        if output.index >= arity {
            return Err(CompileError::IndexError {
                index: output.index,
                arity,
            });
        }
        let source = self.origin(output);
        let node = self.node(source.node);
        let ty = match &node.kind {
            NodeKind::Literal(value) => Some(value.value_type()),
            NodeKind::Argument { declared, .. } => Some(self.argument_type(source.node, *declared)),
            NodeKind::Primitive(p) => p.fixed_output_type(source.index),
            NodeKind::Call(target) => target.signature.outputs.get(source.index).copied(),
        };
        ty.ok_or(CompileError::IndexError {
            index: source.index,
            arity: node.output_arity(),
        })
    }

    fn argument_type(&self, id: NodeId, declared: ValueType) -> ValueType {
        self.bindings.get(&id).copied().unwrap_or(declared)
    }

    /// Fix the concrete type of an argument that was synthesized as `Any`
    pub fn bind_argument(&mut self, id: NodeId, ty: ValueType) {
        trace!(node = id.0, %ty, "binding argument type");
        self.bindings.insert(id, ty);
    }

    /// True when the node is an argument whose type is still open
    pub fn is_unbound_argument(&self, id: NodeId) -> bool {
        matches!(
            self.node(id).kind,
            NodeKind::Argument {
                declared: ValueType::Any,
                ..
            }
        ) && !self.bindings.contains_key(&id)
    }

    /// Render an output reference: `#3` for single-output nodes, `#3.1` otherwise
    pub fn describe(&self, output: OutputRef) -> String {
        if self.output_arity(output.node) == 1 {
            format!("#{}", output.node.0)
        } else {
            format!("#{}.{}", output.node.0, output.index)
        }
    }

    /// One trace line for a node and its operands. Never compiles anything.
    pub fn print_node(&self, id: NodeId) -> String {
        let node = self.node(id);
        let mut line = format!("#{} = {}", id.0, node.label());
        for input in &node.inputs {
            line.push(' ');
            line.push_str(&self.describe(*input));
        }
        line
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.ids() {
            writeln!(f, "{}", self.print_node(id))?;
        }
        Ok(())
    }
}

/// Memoized per-node backend values for one compilation of a graph
#[derive(Debug)]
pub struct Compilation<V> {
    cache: Vec<Option<Vec<V>>>,
}

impl<V: Clone> Compilation<V> {
    pub fn new(graph: &Graph) -> Self {
        Compilation {
            cache: vec![None; graph.len()],
        }
    }

    pub fn is_compiled(&self, id: NodeId) -> bool {
        self.cache.get(id.0).is_some_and(|slot| slot.is_some())
    }

    /// Backend values of a compiled node
    pub fn outputs(&self, id: NodeId) -> Option<&[V]> {
        self.cache.get(id.0)?.as_deref()
    }

    /// Backend value of one output, compiling its node on first request
    pub fn value<B>(
        &mut self,
        graph: &Graph,
        output: OutputRef,
        backend: &mut B,
        functions: &[Option<B::Function>],
    ) -> CompileResult<V>
    where
        B: Backend<Value = V>,
    {
        let values = self.compile(graph, output.node, backend, functions)?;
        values.get(output.index).cloned().ok_or(CompileError::IndexError {
            index: output.index,
            arity: values.len(),
        })
    }

    /// Compile a node once; later calls return the cached values
    pub fn compile<B>(
        &mut self,
        graph: &Graph,
        id: NodeId,
        backend: &mut B,
        functions: &[Option<B::Function>],
    ) -> CompileResult<Vec<V>>
    where
        B: Backend<Value = V>,
    {
        if let Some(Some(values)) = self.cache.get(id.0) {
            return Ok(values.clone());
        }

        let node = graph.node(id);
        let mut operands = Vec::with_capacity(node.inputs.len());
        for input in &node.inputs {
            operands.push(self.value(graph, *input, backend, functions)?);
        }

        trace!(node = id.0, "compiling {}", graph.print_node(id));
        let values = match &node.kind {
            NodeKind::Literal(value) => vec![backend.emit_literal(value)?],
            NodeKind::Argument { index, .. } => {
                let ty = graph.output_type(OutputRef::new(id, 0))?;
                vec![backend.emit_argument(*index, ty)?]
            }
            NodeKind::Primitive(p) => match p.shuffle() {
                // Shufflers only re-route values already computed
                Some(map) => map.iter().map(|&i| operands[i].clone()).collect(),
                None => backend.emit_primitive(*p, &operands)?,
            },
            NodeKind::Call(target) => {
                let function = functions
                    .get(target.word.0)
                    .and_then(|f| f.as_ref())
                    .ok_or_else(|| CompileError::UnsupportedOperation {
                        operation: format!("call to `{}' before it was compiled", target.name),
                    })?;
                backend.emit_call(function, &operands)?
            }
        };

        if values.len() != node.output_arity() {
            return Err(CompileError::ArityError {
                word: node.label(),
                reason: format!(
                    "backend produced {} value(s), node declares {}",
                    values.len(),
                    node.output_arity()
                ),
            });
        }

        self.cache[id.0] = Some(values.clone());
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BinaryOp;

    fn int_mul() -> Primitive {
        Primitive::Binary(BinaryOp::Mul, ValueType::Int32)
    }

    #[test]
    fn test_literal_contract() {
        let mut graph = Graph::new();
        let lit = graph.add_literal(Value::Int(5));

        assert_eq!(graph.input_arity(lit), 0);
        assert_eq!(graph.output_arity(lit), 1);
        assert_eq!(
            graph.output_type(OutputRef::new(lit, 0)).unwrap(),
            ValueType::Int32
        );
        assert!(matches!(
            graph.output_type(OutputRef::new(lit, 1)),
            Err(CompileError::IndexError { index: 1, arity: 1 })
        ));
        assert!(matches!(
            graph.input_type(lit, 0),
            Err(CompileError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_over_types_follow_operands() {
        let mut graph = Graph::new();
        let a = graph.add_literal(Value::Int(1));
        let b = graph.add_literal(Value::Str("x".into()));
        let over = graph
            .add_primitive(
                Primitive::Over,
                vec![OutputRef::new(a, 0), OutputRef::new(b, 0)],
            )
            .unwrap();

        let types: Vec<_> = (0..3)
            .map(|i| graph.output_type(OutputRef::new(over, i)).unwrap())
            .collect();
        assert_eq!(
            types,
            vec![ValueType::Int32, ValueType::String, ValueType::Int32]
        );
        assert_eq!(graph.origin(OutputRef::new(over, 2)), OutputRef::new(a, 0));
    }

    #[test]
    fn test_call_arity_checked() {
        let mut graph = Graph::new();
        let a = graph.add_literal(Value::Int(1));
        let target = CallTarget {
            word: WordId(0),
            name: "foo".to_string(),
            signature: Signature::new(vec![ValueType::Int32; 2], vec![ValueType::Int32]),
        };
        let err = graph
            .add_call(target, vec![OutputRef::new(a, 0)])
            .unwrap_err();
        assert!(matches!(err, CompileError::ArityError { .. }));
    }

    #[test]
    fn test_binding_refines_any_argument() {
        let mut graph = Graph::new();
        let arg = graph.add_argument(0, ValueType::Any);
        let dup = graph
            .add_primitive(Primitive::Dup, vec![OutputRef::new(arg, 0)])
            .unwrap();

        assert!(graph.is_unbound_argument(arg));
        assert_eq!(
            graph.output_type(OutputRef::new(dup, 1)).unwrap(),
            ValueType::Any
        );

        graph.bind_argument(arg, ValueType::Float);
        assert!(!graph.is_unbound_argument(arg));
        assert_eq!(
            graph.output_type(OutputRef::new(dup, 0)).unwrap(),
            ValueType::Float
        );
    }

    #[test]
    fn test_print_node_does_not_compile() {
        let mut graph = Graph::new();
        let arg = graph.add_argument(0, ValueType::Int32);
        let dup = graph
            .add_primitive(Primitive::Dup, vec![OutputRef::new(arg, 0)])
            .unwrap();
        let mul = graph
            .add_primitive(
                int_mul(),
                vec![OutputRef::new(dup, 0), OutputRef::new(dup, 1)],
            )
            .unwrap();

        assert_eq!(graph.print_node(arg), "#0 = arg0");
        assert_eq!(graph.print_node(dup), "#1 = dup #0");
        assert_eq!(graph.print_node(mul), "#2 = * #1.0 #1.1");
        assert_eq!(graph.to_string().lines().count(), 3);
    }
}
