use std::fmt::Write;

use crate::index::{IndexExpr, Var};

/// A kernel buffer parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name.
    pub name: &'static str,
    /// OpenCL C element type.
    pub ty: &'static str,
    /// Whether the kernel writes the buffer.
    pub writable: bool,
}

impl Param {
    /// A buffer the kernel only reads.
    pub fn input(name: &'static str, ty: &'static str) -> Self {
        Self {
            name,
            ty,
            writable: false,
        }
    }

    /// A buffer the kernel writes.
    pub fn output(name: &'static str, ty: &'static str) -> Self {
        Self {
            name,
            ty,
            writable: true,
        }
    }
}

/// The launch grid of a kernel, one work-item per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grid {
    /// A 1-D grid of `n` work-items; the id is bound to the given variable.
    Linear(usize, Var),
    /// A 2-D grid of `rows x cols` work-items bound to `i` and `j`.
    Planar(usize, usize),
}

impl Grid {
    /// Returns the global work sizes.
    pub fn extents(&self) -> Vec<usize> {
        match *self {
            Grid::Linear(n, _) => vec![n],
            Grid::Planar(rows, cols) => vec![rows, cols],
        }
    }

    /// Returns the number of work-items.
    pub fn len(&self) -> usize {
        self.extents().iter().product()
    }

    /// Returns true if the grid launches no work-item.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One statement of a kernel.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `const size_t var = get_global_id(dim);`
    GlobalId {
        /// Bound variable.
        var: Var,
        /// Grid dimension.
        dim: u32,
    },
    /// `const size_t name = index;`
    Index {
        /// Variable name.
        name: &'static str,
        /// Index expression.
        expr: IndexExpr,
    },
    /// `const ty name = buffer[index];`
    Load {
        /// Variable name.
        name: &'static str,
        /// OpenCL C type of the variable.
        ty: &'static str,
        /// Buffer to read.
        buffer: &'static str,
        /// Element index.
        index: IndexExpr,
    },
    /// `ty name = init;`
    Declare {
        /// Variable name.
        name: &'static str,
        /// OpenCL C type of the variable.
        ty: &'static str,
        /// Initial value expression.
        init: String,
    },
    /// `for (var < extent) target += product of terms;`
    Accumulate {
        /// Accumulator variable.
        target: &'static str,
        /// Loop variable.
        var: Var,
        /// Loop length.
        extent: usize,
        /// Buffer reads multiplied together on every iteration.
        terms: Vec<(&'static str, IndexExpr)>,
    },
    /// `buffer[index] = value;`
    Store {
        /// Buffer to write.
        buffer: &'static str,
        /// Element index.
        index: IndexExpr,
        /// Value expression.
        value: String,
    },
}

impl Stmt {
    fn render(&self, out: &mut String) -> std::fmt::Result {
        match self {
            Stmt::GlobalId { var, dim } => {
                writeln!(out, "    const size_t {} = get_global_id({dim});", var.name())
            }
            Stmt::Index { name, expr } => writeln!(out, "    const size_t {name} = {expr};"),
            Stmt::Load {
                name,
                ty,
                buffer,
                index,
            } => writeln!(out, "    const {ty} {name} = {buffer}[{index}];"),
            Stmt::Declare { name, ty, init } => writeln!(out, "    {ty} {name} = {init};"),
            Stmt::Accumulate {
                target,
                var,
                extent,
                terms,
            } => {
                let v = var.name();
                let product = terms
                    .iter()
                    .map(|(buffer, index)| format!("{buffer}[{index}]"))
                    .collect::<Vec<_>>()
                    .join(" * ");
                writeln!(out, "    for (size_t {v} = 0; {v} < {extent}; ++{v}) {{")?;
                writeln!(out, "        {target} += {product};")?;
                writeln!(out, "    }}")
            }
            Stmt::Store {
                buffer,
                index,
                value,
            } => writeln!(out, "    {buffer}[{index}] = {value};"),
        }
    }
}

/// A kernel before serialization to OpenCL C.
///
/// The preamble binds the work-item ids and loads the operands, the body is the
/// caller-supplied text writing `ret`, and the epilogue stores the results.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSource {
    /// Kernel entry point name.
    pub entry: String,
    /// Buffer parameters, in argument order.
    pub params: Vec<Param>,
    /// Statements before the body.
    pub preamble: Vec<Stmt>,
    /// Caller-supplied statements.
    pub body: String,
    /// Statements after the body.
    pub epilogue: Vec<Stmt>,
    /// Launch grid.
    pub grid: Grid,
    /// Whether the kernel needs double precision.
    pub fp64: bool,
}

impl KernelSource {
    /// Starts an empty kernel named `entry` over `grid`.
    pub fn new(entry: impl Into<String>, grid: Grid) -> Self {
        let mut preamble = Vec::new();
        match grid {
            Grid::Linear(_, var) => preamble.push(Stmt::GlobalId { var, dim: 0 }),
            Grid::Planar(..) => {
                preamble.push(Stmt::GlobalId {
                    var: Var::Row,
                    dim: 0,
                });
                preamble.push(Stmt::GlobalId {
                    var: Var::Col,
                    dim: 1,
                });
            }
        }
        Self {
            entry: entry.into(),
            params: Vec::new(),
            preamble,
            body: String::new(),
            epilogue: Vec::new(),
            grid,
            fp64: false,
        }
    }

    /// Returns the index expressions of every buffer access, with the buffer name.
    pub fn accesses(&self) -> Vec<(&'static str, &IndexExpr)> {
        let mut out = Vec::new();
        for stmt in self.preamble.iter().chain(self.epilogue.iter()) {
            match stmt {
                Stmt::Load { buffer, index, .. } | Stmt::Store { buffer, index, .. } => {
                    out.push((*buffer, index))
                }
                Stmt::Accumulate { terms, .. } => {
                    out.extend(terms.iter().map(|(buffer, index)| (*buffer, index)))
                }
                _ => {}
            }
        }
        out
    }

    /// Serializes the kernel to OpenCL C.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.render_into(&mut out);
        log::trace!("rendered kernel {}:\n{}", self.entry, out);
        out
    }

    fn render_into(&self, out: &mut String) -> std::fmt::Result {
        if self.fp64 {
            writeln!(out, "#pragma OPENCL EXTENSION cl_khr_fp64 : enable")?;
        }
        let params = self
            .params
            .iter()
            .map(|p| {
                let constness = if p.writable { "" } else { "const " };
                format!("__global {constness}{}* {}", p.ty, p.name)
            })
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "__kernel void {}({params}) {{", self.entry)?;
        for stmt in &self.preamble {
            stmt.render(out)?;
        }
        for line in self.body.lines() {
            writeln!(out, "    {}", line.trim())?;
        }
        for stmt in &self.epilogue {
            stmt.render(out)?;
        }
        writeln!(out, "}}")
    }
}
