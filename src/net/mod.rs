//! # 随机 Petri 网定义（Stochastic Place/Transition Net）
//!
//! 设库所集合 `P` 与迁移集合 `T`。输入/输出映射 `Pre, Post ∈ ℕ^{|P|×|T|}`，
//! 迁移效应矩阵 `C = Post - Pre`。对任意标识 `M ∈ ℕ^{|P|}`：
//!
//! * 迁移 `t` **可激发** 当且仅当其守卫 `g_t(M)` 成立；未给出守卫时
//!   `g_t(M) ≡ ∀p ∈ P: M[p] ≥ Pre[p, t]`；
//! * 可激发迁移的速率 `λ_t(M) ≥ 0` 由速率表达式给出，发射延迟服从 `Exp(λ_t(M))`；
//! * 迁移 **发射** 后 `M' = M + C[:, t]`，任一库所将变为负数时整体拒绝。
//!
//! ## 示例
//!
//! ```rust
//! use spnsim::net::*;
//!
//! let mut net = Net::empty();
//! let source = net.add_place(Place::new("source", 2));
//! let sink = net.add_place(Place::new("sink", 0));
//! let t = net.add_transition(Transition::new("move", Expr::tokens(source)));
//!
//! net.add_input_arc(source, t, 1);
//! net.add_output_arc(sink, t, 1);
//!
//! let marking = net.initial_marking();
//! assert_eq!(net.enabled_transitions(&marking).unwrap(), vec![t]);
//! assert_eq!(net.raw_rate(t, &marking).unwrap(), 2.0);
//! let next = net.fire_transition(&marking, t).unwrap();
//! assert_eq!(next.tokens(source), 1);
//! assert_eq!(next.tokens(sink), 1);
//! ```

pub mod core;
pub mod definition;
pub mod expr;
pub mod ids;
pub mod incidence;
pub mod index_vec;
pub mod io;
pub mod parse;
pub mod structure;

pub use core::{Delta, DiagnosticReport, FireError, Net};
pub use definition::{BuildError, NetDefinition, TransitionDefinition};
pub use expr::{ArithOp, CmpOp, Expr, ExprError, Value};
pub use ids::{PlaceId, TransitionId};
pub use incidence::Incidence;
pub use index_vec::{Idx, IndexVec};
pub use parse::{ParseError, parse_expr};
pub use structure::{Marking, Place, Transition, Weight};
