//! End-to-end propagation over single-file programs
//!
//! Each test assembles a small program at `/code/src.py` and checks the printed value of a few
//! symbols after the default number of passes.

use lantern_analyzer::{Assembler, Assembly, MemoryGraph, Options, SourceBundle};
use lantern_core::CancelHandle;
use lantern_parser::PythonParser;
use std::path::Path;

const SRC: &str = "/code/src.py";

fn assemble_with(files: &[(&str, &str)], options: Options) -> Assembly {
    let mut parser = PythonParser::new().unwrap();
    let mut assembler = Assembler::new(MemoryGraph::bundled(), options);
    for (path, source) in files {
        assembler.add_source(SourceBundle::parse(*path, source, &mut parser).unwrap());
    }
    assembler.build(&CancelHandle::new()).unwrap();
    assembler.into_assembly()
}

fn assemble(source: &str) -> Assembly {
    assemble_with(&[(SRC, source)], Options { use_capabilities: false, ..Options::default() })
}

fn value(asm: &Assembly, path: &str) -> String {
    asm.value_of(Path::new(SRC), path)
        .unwrap_or_else(|| panic!("no symbol {path}"))
        .to_string()
}

#[test]
fn test_literals() {
    let asm = assemble("a = [1, 'foo']\nb = (1, 2.0, 3j)\nc = {1, 2}\nd = None\ne = True\n");
    assert_eq!(value(&asm, "a"), "list[int(1) | str('foo')]");
    assert_eq!(value(&asm, "b"), "tuple(int(1), float, complex)");
    assert_eq!(value(&asm, "c"), "set[int]");
    assert_eq!(value(&asm, "d"), "None");
    assert_eq!(value(&asm, "e"), "bool(True)");
}

#[test]
fn test_large_ints_lose_their_constant() {
    let asm = assemble("small = 7\nlarge = 123456\n");
    assert_eq!(value(&asm, "small"), "int(7)");
    assert_eq!(value(&asm, "large"), "int");
}

#[test]
fn test_reassignment_unites() {
    let asm = assemble("x = 1\nx = 'a'\n");
    assert_eq!(value(&asm, "x"), "int(1) | str('a')");
}

#[test]
fn test_string_operations() {
    let asm = assemble("s = 'a' + 'b'\nt = 'x%s' % 1\nu = f'{s}!'\n");
    assert_eq!(value(&asm, "s"), "str('ab')");
    assert_eq!(value(&asm, "t"), "str");
    assert_eq!(value(&asm, "u"), "str");
}

#[test]
fn test_division_is_float() {
    let asm = assemble("q = 1 / 2\n");
    assert_eq!(value(&asm, "q"), "float");
}

#[test]
fn test_comprehensions() {
    let asm = assemble(
        "a = [i for i in [1, 2]]\n\
         b = {k: v for k, v in [('a', 1)]}\n\
         c = {(x, y) for x in [1] for y in [2]}\n",
    );
    assert_eq!(value(&asm, "a"), "list[int]");
    assert_eq!(value(&asm, "b"), "dict[str, int]");
    assert_eq!(value(&asm, "c"), "set[tuple(int, int)]");
    // comprehension variables stay in their own scope
    assert!(asm.value_of(Path::new(SRC), "x").is_none());
    assert!(asm.value_of(Path::new(SRC), "i").is_none());
}

#[test]
fn test_generator_expression() {
    let asm = assemble("g = (yy for yy in [1])\n");
    assert_eq!(value(&asm, "g"), "generator[int]");
}

#[test]
fn test_default_and_call_arguments_unite() {
    let asm = assemble("def f(x=1):\n    return x\nout = f('foo')\n");
    assert_eq!(value(&asm, "f.x"), "int(1) | str('foo')");
    assert_eq!(value(&asm, "out"), "int(1) | str('foo')");
}

#[test]
fn test_chained_calls_need_enough_passes() {
    let source = "def f(x):\n    return x\n\
                  def g(y):\n    return f(y)\n\
                  def h(z):\n    return g(z)\n\
                  out = h('xyz')\n";
    let short = assemble_with(&[(SRC, source)], Options { passes: 3, use_capabilities: false, ..Options::default() });
    assert_eq!(value(&short, "out"), "?");

    let long = assemble_with(&[(SRC, source)], Options { passes: 4, use_capabilities: false, ..Options::default() });
    assert_eq!(value(&long, "out"), "str('xyz')");
}

#[test]
fn test_keyword_arguments() {
    let asm = assemble("def foo(x, y=None):\n    return y\nfoo(y=2, x=1)\n");
    assert_eq!(value(&asm, "foo.x"), "int(1)");
    assert_eq!(value(&asm, "foo.y"), "None | int(2)");
}

#[test]
fn test_varargs_collect_overflow() {
    let asm = assemble(
        "class C:\n    def foo(self, a, *args):\n        return a\n\
         C().foo(1, 'x', True)\n",
    );
    assert_eq!(value(&asm, "C.foo.a"), "int(1)");
    assert_eq!(value(&asm, "C.foo.args"), "list[str('x') | bool(True)]");
}

#[test]
fn test_star_spread_binds_varargs() {
    let asm = assemble("def foo(a, *args):\n    return a\ndata = ['x', 'y']\nfoo(-1, *data)\n");
    assert_eq!(value(&asm, "foo.args"), "list[str('x') | str('y')]");
}

#[test]
fn test_constructor_sets_instance_members() {
    let asm = assemble(
        "class C:\n    def __init__(self, v):\n        self.v = v\n\
         c = C(1)\nout = c.v\n",
    );
    assert_eq!(value(&asm, "C.v"), "int(1)");
    assert_eq!(value(&asm, "out"), "int(1)");
    assert_eq!(value(&asm, "c"), "instance C");
    assert_eq!(value(&asm, "C.__init__.self"), "instance C");
}

#[test]
fn test_inherited_methods() {
    let asm = assemble(
        "class A:\n    def name(self):\n        return 'a'\n\
         class B(A):\n    pass\n\
         out = B().name()\n",
    );
    assert_eq!(value(&asm, "out"), "str('a')");
    // the receiver covers every subclass
    assert_eq!(value(&asm, "A.name.self"), "instance A | instance B");
}

#[test]
fn test_staticmethod_has_no_receiver() {
    let asm = assemble(
        "class C:\n    @staticmethod\n    def make(n):\n        return n\n\
         out = C.make(1)\n",
    );
    assert_eq!(value(&asm, "C.make.n"), "int(1)");
    assert_eq!(value(&asm, "out"), "int(1)");
}

#[test]
fn test_class_dunders() {
    let asm = assemble("class C:\n    pass\nname = C.__name__\nkind = C().__class__\n");
    assert_eq!(value(&asm, "name"), "str('C')");
    assert_eq!(value(&asm, "kind"), "class C");
}

#[test]
fn test_class_scope_is_invisible_to_methods() {
    let asm = assemble(
        "x = 1.5\n\
         class C:\n    x = 'shadow'\n    def f(self):\n        return x\n\
         out = C().f()\n",
    );
    assert_eq!(value(&asm, "C.x"), "str('shadow')");
    assert_eq!(value(&asm, "out"), "float");
}

#[test]
fn test_property_decorator() {
    let asm = assemble(
        "class C:\n    @property\n    def foo(self):\n        return 123\n\
         c = C()\nfoo_val = c.foo\n",
    );
    assert_eq!(value(&asm, "foo_val"), "int(123)");
}

#[test]
fn test_generator_function() {
    let asm = assemble("def gen():\n    yield 1\nx = gen()\n");
    assert_eq!(value(&asm, "x"), "generator[int(1)]");
}

#[test]
fn test_lambda() {
    let asm = assemble("f = lambda a: a\nout = f(2.5)\n");
    assert_eq!(value(&asm, "out"), "float");
}

#[test]
fn test_eval_of_constant_string() {
    let asm = assemble("out = eval(\"'abc'\")\n");
    assert_eq!(value(&asm, "out"), "str('abc')");
}

#[test]
fn test_index_assignment_grows_containers() {
    let asm = assemble("a = []\na[0] = 1\nd = {}\nd['k'] = [1.5]\n");
    assert_eq!(value(&asm, "a"), "list[int(1)]");
    assert_eq!(value(&asm, "d"), "dict[str, list[float]]");
}

#[test]
fn test_mutating_calls_rebind() {
    let asm = assemble("l = []\nl.append(1)\nl.append('hello')\n");
    assert_eq!(value(&asm, "l"), "list[int(1) | str('hello')]");
}

#[test]
fn test_destructuring() {
    let asm = assemble("a, b = 1, 'x'\nc, d = {'s'}\ne, f = {1: 2, 'k': 3}\n");
    assert_eq!(value(&asm, "a"), "int(1)");
    assert_eq!(value(&asm, "b"), "str('x')");
    assert_eq!(value(&asm, "c"), "str");
    assert_eq!(value(&asm, "e"), "int | str");
}

#[test]
fn test_for_loop_target() {
    let asm = assemble("for item in [1.5]:\n    pass\n");
    assert_eq!(value(&asm, "item"), "float");
}

#[test]
fn test_assert_isinstance_narrows() {
    let asm = assemble(
        "class Base:\n    pass\nclass Derived(Base):\n    pass\n\
         def f(x):\n    assert isinstance(x, Base)\n    return x\n\
         f(1)\n",
    );
    assert_eq!(value(&asm, "f.x"), "instance Base");
}

#[test]
fn test_global_declaration() {
    let asm = assemble("counter = 0\ndef bump():\n    global counter\n    counter = 'reset'\nbump()\n");
    assert_eq!(value(&asm, "counter"), "int(0) | str('reset')");
    assert!(asm.value_of(Path::new(SRC), "bump.counter").is_none());
}

#[test]
fn test_exception_handler_binds_instance() {
    let asm = assemble("class Oops(Exception):\n    pass\ntry:\n    pass\nexcept Oops as e:\n    pass\n");
    assert_eq!(value(&asm, "e"), "instance Oops");
}

#[test]
fn test_list_literal_destructures_per_element() {
    let asm = assemble("a, b = [1, 'x']\n");
    assert_eq!(value(&asm, "a"), "int(1)");
    assert_eq!(value(&asm, "b"), "str('x')");
}

#[test]
fn test_receiver_sees_subclass_members() {
    let asm = assemble(
        "class C:\n    def foo(self):\n        probe = self.bar\n\
         class D(C):\n    def bar(self):\n        pass\n",
    );
    assert_eq!(value(&asm, "C.foo.probe"), "function bar");
}

#[test]
fn test_base_method_reads_subclass_overrides() {
    let asm = assemble(
        "class Base:\n    def get(self):\n        return self.attr\n\
         class A(Base):\n    attr = 1\n\
         class B(Base):\n    attr = 'b'\n\
         out = Base().get()\n\
         out_a = A().get()\n",
    );
    assert_eq!(value(&asm, "Base.get.self"), "instance Base | instance A | instance B");
    assert_eq!(value(&asm, "out"), "int(1) | str('b')");
    // one return symbol per function, so a subclass call sees every override
    assert!(value(&asm, "out_a").contains("int(1)"));
}

#[test]
fn test_orm_models_get_managers() {
    let asm = assemble(
        "from django.db import models\n\
         class User(models.Model):\n    name = 'anon'\n\
         users = User.objects.filter()\n\
         first = User.objects.get()\n\
         for u in users:\n    pass\n",
    );
    assert_eq!(value(&asm, "users"), "QuerySet[User]");
    assert_eq!(value(&asm, "first"), "instance User");
    assert_eq!(value(&asm, "u"), "instance User");
    assert_eq!(value(&asm, "User.name"), "str('anon')");
}
