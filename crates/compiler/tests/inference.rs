//! Stack-effect inference properties
//!
//! These tests drive whole sessions and inspect the resulting graphs and
//! signatures. A counting backend records every emission so that sharing
//! can be checked without looking at generated code.

use llforthc::builtins::Primitive;
use llforthc::{
    Backend, CompileError, CompileResult, NodeKind, Session, Signature, Value, ValueType, VmBackend,
};

/// Counts cover the most recently compiled body
#[derive(Debug, Default)]
struct CountingBackend {
    arguments: usize,
    literals: usize,
    primitives: Vec<&'static str>,
    calls: usize,
    next: usize,
}

impl CountingBackend {
    fn fresh(&mut self) -> usize {
        self.next += 1;
        self.next
    }
}

impl Backend for CountingBackend {
    type Value = usize;
    /// Output arity of the function
    type Function = usize;

    fn declare_function(
        &mut self,
        _name: &str,
        _symbol: &str,
        sig: &Signature,
    ) -> CompileResult<usize> {
        Ok(sig.output_arity())
    }

    fn begin_body(&mut self, _function: &usize) -> CompileResult<()> {
        *self = CountingBackend {
            next: self.next,
            ..Default::default()
        };
        Ok(())
    }

    fn emit_argument(&mut self, _index: usize, _ty: ValueType) -> CompileResult<usize> {
        self.arguments += 1;
        Ok(self.fresh())
    }

    fn emit_literal(&mut self, _value: &Value) -> CompileResult<usize> {
        self.literals += 1;
        Ok(self.fresh())
    }

    fn emit_primitive(
        &mut self,
        primitive: Primitive,
        _operands: &[usize],
    ) -> CompileResult<Vec<usize>> {
        self.primitives.push(primitive.name());
        Ok(vec![self.fresh()])
    }

    fn emit_call(&mut self, function: &usize, _arguments: &[usize]) -> CompileResult<Vec<usize>> {
        self.calls += 1;
        Ok((0..*function).map(|_| self.fresh()).collect())
    }

    fn finish_body(&mut self, _function: &usize, _outputs: &[usize]) -> CompileResult<()> {
        Ok(())
    }
}

fn counting() -> Session<CountingBackend> {
    Session::new(CountingBackend::default())
}

fn sig(session: &Session<impl Backend>, name: &str) -> String {
    session.signature(name).unwrap().to_string()
}

#[test]
fn test_underflow_infers_int_arguments() {
    let mut session = counting();
    session.run(": f + ;").unwrap();

    assert_eq!(sig(&session, "f"), "( i i -- i )");
    let f = session.definition("f").unwrap();
    assert_eq!(f.arguments.len(), 2);
    assert_eq!(f.graph.len(), 3);
}

#[test]
fn test_polymorphic_use_infers_any() {
    let mut session = counting();
    session.run(": g dup ;").unwrap();
    assert_eq!(sig(&session, "g"), "( ? -- ? ? )");
}

#[test]
fn test_first_use_fixes_type() {
    let mut session = counting();
    session
        .run(": h dup * ; : hf dup *. ; : s swap i>s ;")
        .unwrap();

    assert_eq!(sig(&session, "h"), "( i -- i )");
    assert_eq!(sig(&session, "hf"), "( f -- f )");
    // `swap` sees two open arguments; `i>s` fixes only the one it consumes
    assert_eq!(sig(&session, "s"), "( ? i -- ? s )");
}

#[test]
fn test_same_tokens_different_primitives() {
    let mut session = counting();
    session.run(": a over + ; : b over +. ;").unwrap();
    assert_eq!(sig(&session, "a"), "( i i -- i i )");
    assert_eq!(sig(&session, "b"), "( f f -- f f )");
}

#[test]
fn test_inference_is_deterministic() {
    let body = ": w rot swap over - * i>f 2.5 *. ;";
    let mut first = counting();
    let mut second = counting();
    first.run(body).unwrap();
    second.run(body).unwrap();
    // Redefinition inside one session infers the same thing again
    second.run(body).unwrap();

    let a = first.definition("w").unwrap();
    let b = second.definition("w").unwrap();
    assert_eq!(a.signature().unwrap(), b.signature().unwrap());
    let kinds = |d: &llforthc::FunctionDefinition| {
        d.arguments
            .iter()
            .map(|&id| d.graph.node(id).kind.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(kinds(a), kinds(b));
}

#[test]
fn test_shared_node_compiles_once() {
    let mut session = counting();
    session.run(": h dup * ;").unwrap();

    let backend = session.backend();
    assert_eq!(backend.arguments, 1);
    assert_eq!(backend.literals, 0);
    assert_eq!(backend.primitives, vec!["*"]);
    assert_eq!(backend.calls, 0);
}

#[test]
fn test_diamond_sharing() {
    let mut session = counting();
    // The `+` result is consumed twice through `over`
    session.run(": d 1 2 + dup over * swap - ;").unwrap();

    let backend = session.backend();
    assert_eq!(backend.literals, 2);
    assert_eq!(backend.primitives, vec!["+", "*", "-"]);
}

#[test]
fn test_drop_still_compiles_operand() {
    let mut session = counting();
    session.run(": z 1 2 + drop ;").unwrap();

    assert_eq!(sig(&session, "z"), "( -- )");
    assert_eq!(session.backend().primitives, vec!["+"]);
}

#[test]
fn test_round_trip_over() {
    let mut session = Session::new(VmBackend::new());
    session.run(": r 1 2 over ;").unwrap();

    assert_eq!(sig(&session, "r"), "( -- i i i )");
    assert!(session.definition("r").unwrap().arguments.is_empty());

    session.run("r .s").unwrap();
    assert_eq!(session.take_output(), "<3> 1 2 1\n");
}

#[test]
fn test_rot_order() {
    let mut session = Session::new(VmBackend::new());
    session.run("1 2 3 rot .s : r3 rot ; 1 2 3 r3 .s").unwrap();
    assert_eq!(session.take_output(), "<3> 2 3 1\n<6> 2 3 1 2 3 1\n");
}

#[test]
fn test_extern_call_node() {
    let mut session = counting();
    session.run("extern foo ( i i -- i ) : k 1 2 foo ;").unwrap();

    let k = session.definition("k").unwrap();
    assert!(k.arguments.is_empty());
    let call = k
        .body()
        .find(|&id| matches!(k.graph.node(id).kind, NodeKind::Call(_)))
        .unwrap();
    assert_eq!(k.graph.input_arity(call), 2);
    assert_eq!(k.graph.output_arity(call), 1);
    assert!(
        k.body()
            .all(|id| !matches!(k.graph.node(id).kind, NodeKind::Argument { .. }))
    );
    assert_eq!(session.backend().calls, 1);
}

#[test]
fn test_shadowing_keeps_old_call_target() {
    let mut session = Session::new(VmBackend::new());
    session.run(": a 1 ; : b a ; : a 2 ; : c a ;").unwrap();

    let target = |name: &str| {
        let def = session.definition(name).unwrap();
        def.body()
            .find_map(|id| match &def.graph.node(id).kind {
                NodeKind::Call(target) => Some(target.word),
                _ => None,
            })
            .unwrap()
    };
    assert_ne!(target("b"), target("c"));
    assert_eq!(Some(target("c")), session.dictionary().find("a"));

    session.run("b . c .").unwrap();
    assert_eq!(session.take_output(), "1 2 ");
}

#[test]
fn test_body_type_error_names_position() {
    let mut session = counting();
    let err = session.run(": bad 1 \" s\" + ;").unwrap_err();
    assert_eq!(
        err,
        CompileError::TypeError {
            word: "+".to_string(),
            position: 2,
            expected: ValueType::Int32,
            actual: ValueType::String,
        }
    );
    assert!(session.definition("bad").is_none());
}

#[test]
fn test_polymorphic_call_result_cannot_be_refined() {
    let mut session = counting();
    session.run(": g dup ;").unwrap();
    let err = session.run(": k 1 g + ;").unwrap_err();
    assert!(matches!(
        err,
        CompileError::TypeError {
            expected: ValueType::Int32,
            actual: ValueType::Any,
            ..
        }
    ));
}

#[test]
fn test_inline_polymorphic_word_is_refined() {
    let mut session = counting();
    session.run(": g dup ; inline : k g + ;").unwrap();
    assert_eq!(sig(&session, "k"), "( i -- i )");
    assert_eq!(session.backend().calls, 0);
}

#[test]
fn test_multi_output_call() {
    let mut session = Session::new(VmBackend::new());
    session
        .run(": pair 1 2.5 ; : use pair f>i + ; use .")
        .unwrap();
    assert_eq!(sig(&session, "use"), "( -- i )");
    assert_eq!(session.take_output(), "3 ");
}

#[test]
fn test_long_dup_chain_types_in_linear_time() {
    // Each `dup +` doubles the fan-out behind the top value
    let body = " dup +".repeat(400);
    let mut session = counting();
    session.run(&format!(": f 1{} ;", body)).unwrap();

    assert_eq!(sig(&session, "f"), "( -- i )");
    assert_eq!(session.backend().primitives.len(), 400);
}

#[test]
fn test_very_long_body() {
    let body = " 1 +".repeat(10_000);
    let mut session = Session::new(VmBackend::new());
    session.run(&format!(": f 1{} ; f .", body)).unwrap();

    assert_eq!(session.definition("f").unwrap().graph.len(), 20_001);
    assert_eq!(session.take_output(), "10001 ");
}
