//! Colon definitions
//!
//! A `FunctionDefinition` is built token by token while its body is parsed
//! and becomes immutable once it is registered in the dictionary. Its body
//! is the node arena in creation order; its outputs are the residual stack,
//! bottom-to-top.

use crate::backend::Backend;
use crate::error::{CompileError, CompileResult};
use crate::graph::{Compilation, Graph, NodeId, NodeKind, OutputRef};
use crate::inference::InferenceStack;
use crate::types::Signature;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub graph: Graph,
    /// Argument nodes in argument order
    pub arguments: Vec<NodeId>,
    /// Residual stack, bottom-to-top
    pub outputs: Vec<OutputRef>,
    /// Body tokens as written, for `see`
    pub source: Vec<String>,
}

impl FunctionDefinition {
    pub fn new(name: &str) -> Self {
        FunctionDefinition {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Body nodes in creation order
    pub fn body(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.ids()
    }

    pub fn input_arity(&self) -> usize {
        self.arguments.len()
    }

    pub fn output_arity(&self) -> usize {
        self.outputs.len()
    }

    /// Inferred signature, with `Any` arguments resolved where a later use bound them
    pub fn signature(&self) -> CompileResult<Signature> {
        let inputs = self
            .arguments
            .iter()
            .map(|&arg| self.graph.output_type(OutputRef::new(arg, 0)))
            .collect::<CompileResult<Vec<_>>>()?;
        let outputs = self
            .outputs
            .iter()
            .map(|&out| self.graph.output_type(out))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(Signature::new(inputs, outputs))
    }

    /// Generate code for the body into an already declared function.
    ///
    /// Every node is compiled in creation order through one memoized cache,
    /// so shared nodes are emitted once. The cache is returned for inspection.
    pub fn compile<B: Backend>(
        &self,
        function: &B::Function,
        backend: &mut B,
        functions: &[Option<B::Function>],
    ) -> CompileResult<Compilation<B::Value>> {
        debug!(name = %self.name, nodes = self.graph.len(), "compiling definition");
        backend.begin_body(function)?;

        let mut compilation = Compilation::new(&self.graph);
        for id in self.body() {
            compilation.compile(&self.graph, id, backend, functions)?;
        }

        let outputs = self
            .outputs
            .iter()
            .map(|&out| compilation.value(&self.graph, out, backend, functions))
            .collect::<CompileResult<Vec<_>>>()?;
        backend.finish_body(function, &outputs)?;
        Ok(compilation)
    }

    /// Splice this body into a caller's graph.
    ///
    /// Arguments are popped from the caller stack in argument order, typed by
    /// this definition's signature; the copied outputs are pushed afterwards.
    pub fn inline_into(
        &self,
        graph: &mut Graph,
        stack: &mut InferenceStack,
        position: usize,
    ) -> CompileResult<()> {
        let signature = self.signature()?;
        let mut arguments = Vec::with_capacity(signature.input_arity());
        for &ty in &signature.inputs {
            arguments.push(stack.pop(graph, ty, &self.name, position)?);
        }

        let mut copies: Vec<Option<NodeId>> = vec![None; self.graph.len()];
        let remap = |output: OutputRef, copies: &[Option<NodeId>]| -> CompileResult<OutputRef> {
            match &self.graph.node(output.node).kind {
                NodeKind::Argument { index, .. } => Ok(arguments[*index]),
                _ => copies[output.node.0]
                    .map(|node| OutputRef::new(node, output.index))
                    .ok_or_else(|| CompileError::UnsupportedOperation {
                        operation: format!(
                            "inlining `{}': operand used before definition",
                            self.name
                        ),
                    }),
            }
        };

        for id in self.body() {
            let node = self.graph.node(id);
            let inputs = node
                .inputs
                .iter()
                .map(|&input| remap(input, &copies))
                .collect::<CompileResult<Vec<_>>>()?;
            copies[id.0] = match &node.kind {
                NodeKind::Argument { .. } => None,
                NodeKind::Literal(value) => Some(graph.add_literal(value.clone())),
                NodeKind::Primitive(p) => Some(graph.add_primitive(*p, inputs)?),
                NodeKind::Call(target) => Some(graph.add_call(target.clone(), inputs)?),
            };
        }

        for &output in &self.outputs {
            stack.push_ref(remap(output, &copies)?);
        }
        Ok(())
    }

    /// Node-level trace: the header line followed by one line per node
    pub fn trace(&self) -> String {
        let mut text = String::new();
        let signature = self
            .signature()
            .map(|s| s.to_string())
            .unwrap_or_else(|e| format!("<{}>", e));
        text.push_str(&format!(": {} {}\n", self.name, signature));
        for id in self.body() {
            text.push_str("  ");
            text.push_str(&self.graph.print_node(id));
            text.push('\n');
        }
        let outputs: Vec<_> = self
            .outputs
            .iter()
            .map(|&out| self.graph.describe(out))
            .collect();
        text.push_str(&format!("  -> [{}]\n;", outputs.join(" ")));
        text
    }
}

impl fmt::Display for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ": {}", self.name)?;
        if let Ok(signature) = self.signature() {
            write!(f, " {}", signature)?;
        }
        for token in &self.source {
            write!(f, " {}", token)?;
        }
        write!(f, " ;")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{BinaryOp, Primitive};
    use crate::types::ValueType;
    use crate::value::Value;

    /// `: square dup * ;` built by hand
    fn square() -> FunctionDefinition {
        let mut def = FunctionDefinition::new("square");
        let arg = def.graph.add_argument(0, ValueType::Int32);
        let dup = def
            .graph
            .add_primitive(Primitive::Dup, vec![OutputRef::new(arg, 0)])
            .unwrap();
        let mul = def
            .graph
            .add_primitive(
                Primitive::Binary(BinaryOp::Mul, ValueType::Int32),
                vec![OutputRef::new(dup, 0), OutputRef::new(dup, 1)],
            )
            .unwrap();
        def.arguments = vec![arg];
        def.outputs = vec![OutputRef::new(mul, 0)];
        def.source = vec!["dup".into(), "*".into()];
        def
    }

    #[test]
    fn test_signature_and_display() {
        let def = square();
        assert_eq!(def.signature().unwrap().to_string(), "( i -- i )");
        assert_eq!(def.to_string(), ": square ( i -- i ) dup * ;");
        assert_eq!(def.input_arity(), 1);
        assert_eq!(def.output_arity(), 1);
    }

    #[test]
    fn test_trace_lists_nodes() {
        let trace = square().trace();
        assert!(trace.starts_with(": square ( i -- i )\n"));
        assert!(trace.contains("#2 = * #1.0 #1.1"));
        assert!(trace.ends_with("-> [#2]\n;"));
    }

    #[test]
    fn test_compile_shares_dup_operand() {
        use crate::backend::{Backend, VmBackend};

        let def = square();
        let mut vm = VmBackend::new();
        let function = vm
            .declare_function("square", "square", &def.signature().unwrap())
            .unwrap();
        let compilation = def.compile(&function, &mut vm, &[]).unwrap();

        assert!(def.body().all(|id| compilation.is_compiled(id)));
        // Both outputs of `dup` are the argument's register
        let dup = compilation.outputs(NodeId(1)).unwrap();
        assert_eq!(dup[0], dup[1]);
        assert_eq!(compilation.outputs(NodeId(0)).unwrap(), &dup[..1]);
        assert_eq!(vm.code(function).unwrap().len(), 2);
    }

    #[test]
    fn test_inline_splices_body() {
        let callee = square();
        let mut graph = Graph::new();
        let mut stack = InferenceStack::new();
        let lit = graph.add_literal(Value::Int(3));
        stack.push(&graph, lit);

        callee.inline_into(&mut graph, &mut stack, 1).unwrap();

        // literal + dup + mul; the callee's argument node is not copied
        assert_eq!(graph.len(), 3);
        assert_eq!(stack.depth(), 1);
        let dup = NodeId(1);
        assert_eq!(graph.node(dup).inputs, vec![OutputRef::new(lit, 0)]);
        assert!(stack.arguments().is_empty());
    }

    #[test]
    fn test_inline_underflow_becomes_caller_argument() {
        let callee = square();
        let mut graph = Graph::new();
        let mut stack = InferenceStack::new();

        callee.inline_into(&mut graph, &mut stack, 0).unwrap();

        assert_eq!(stack.arguments().len(), 1);
        assert_eq!(
            graph.output_type(stack.contents()[0]).unwrap(),
            ValueType::Int32
        );
    }
}
