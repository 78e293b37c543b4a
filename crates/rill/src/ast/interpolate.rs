//! The interpolation pass: rewrites `"… ${var} …"` string literals into
//! calls to the `+` concatenation operator, and performs the one-time
//! program-level lowering of colon-named nested classes (`class a:b`).
//!
//! The pass is copy-on-write: untouched subtrees keep their node ids, so a
//! constant expression interpolates to itself.

use std::borrow::Cow;

use crate::{
    ast::{Arena, CallExpr, Expr, ResContent, Stmt, StmtId, VarExpr},
    errors::{LangError, LangResult},
    span::SrcSpan,
};

/// One piece of an interpolated string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fragment {
    Lit(String),
    Var(String),
}

impl Arena {
    /// Interpolates an expression subtree, returning the (possibly new)
    /// root id. The same id comes back when nothing needed rewriting.
    pub fn interpolate_expr(&mut self, id: crate::ast::ExprId) -> LangResult<crate::ast::ExprId> {
        let span = self.expr_span(id);
        match self.expr(id).clone() {
            Expr::Str(s) => {
                if !s.contains('$') {
                    return Ok(id);
                }
                let fragments = scan_fragments(&s, span)?;
                Ok(self.fragments_to_expr(fragments, span))
            }
            Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Var(_) | Expr::Param(_) => Ok(id),
            Expr::List(items) => {
                let mut changed = false;
                let mut new_items = Vec::with_capacity(items.len());
                for item in items {
                    let ni = self.interpolate_expr(item)?;
                    changed |= ni != item;
                    new_items.push(ni);
                }
                if changed {
                    *self.expr_mut(id) = Expr::List(new_items);
                }
                Ok(id)
            }
            Expr::Map(pairs) => {
                let mut changed = false;
                let mut new_pairs = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let nk = self.interpolate_expr(k)?;
                    let nv = self.interpolate_expr(v)?;
                    changed |= nk != k || nv != v;
                    new_pairs.push((nk, nv));
                }
                if changed {
                    *self.expr_mut(id) = Expr::Map(new_pairs);
                }
                Ok(id)
            }
            Expr::Struct(mut fields) => {
                let mut changed = false;
                for f in &mut fields {
                    let nv = self.interpolate_expr(f.value)?;
                    changed |= nv != f.value;
                    f.value = nv;
                }
                if changed {
                    *self.expr_mut(id) = Expr::Struct(fields);
                }
                Ok(id)
            }
            Expr::Func(mut func) => {
                if let crate::ast::FuncCore::Lambda(body) = func.body {
                    let nb = self.interpolate_expr(body)?;
                    if nb != body {
                        func.body = crate::ast::FuncCore::Lambda(nb);
                        *self.expr_mut(id) = Expr::Func(func);
                    }
                }
                Ok(id)
            }
            Expr::Call(mut call) => {
                let mut changed = false;
                for arg in &mut call.args {
                    let na = self.interpolate_expr(*arg)?;
                    changed |= na != *arg;
                    *arg = na;
                }
                if changed {
                    *self.expr_mut(id) = Expr::Call(call);
                }
                Ok(id)
            }
            Expr::If(mut e) => {
                let nc = self.interpolate_expr(e.cond)?;
                let nt = self.interpolate_expr(e.then_)?;
                let ne = self.interpolate_expr(e.else_)?;
                if nc != e.cond || nt != e.then_ || ne != e.else_ {
                    e.cond = nc;
                    e.then_ = nt;
                    e.else_ = ne;
                    *self.expr_mut(id) = Expr::If(e);
                }
                Ok(id)
            }
            // Wrappers only exist after scope resolution; interpolation runs
            // before it, so seeing one here is harmless and inert.
            Expr::Iterated(_) | Expr::Poly(_) | Expr::TopLevel(_) | Expr::Singleton(_) => Ok(id),
        }
    }

    /// Interpolates a statement subtree in place. `top_level` enables the
    /// colon-class lowering, which is only valid on the outermost program.
    pub fn interpolate_stmt(&mut self, id: StmtId, top_level: bool) -> LangResult<()> {
        match self.stmt(id).clone() {
            Stmt::Bind(mut s) => {
                s.value = self.interpolate_expr(s.value)?;
                *self.stmt_mut(id) = Stmt::Bind(s);
                Ok(())
            }
            Stmt::Func(mut s) => {
                s.func = self.interpolate_expr(s.func)?;
                *self.stmt_mut(id) = Stmt::Func(s);
                Ok(())
            }
            Stmt::Class(mut s) => {
                for p in &mut s.params {
                    if let Some(d) = p.default {
                        p.default = Some(self.interpolate_expr(d)?);
                    }
                }
                let body = s.body;
                *self.stmt_mut(id) = Stmt::Class(s);
                self.interpolate_stmt(body, false)
            }
            Stmt::Include(mut s) => {
                for arg in &mut s.args {
                    *arg = self.interpolate_expr(*arg)?;
                }
                *self.stmt_mut(id) = Stmt::Include(s);
                Ok(())
            }
            Stmt::Import(_) | Stmt::Comment(_) => Ok(()),
            Stmt::Res(mut s) => {
                s.name = self.interpolate_expr(s.name)?;
                for content in &mut s.contents {
                    match content {
                        ResContent::Field(f) => f.value = self.interpolate_expr(f.value)?,
                        ResContent::Edge(e) => e.name = self.interpolate_expr(e.name)?,
                        ResContent::Meta(m) => m.value = self.interpolate_expr(m.value)?,
                        ResContent::Collect(c) => c.value = self.interpolate_expr(c.value)?,
                    }
                }
                *self.stmt_mut(id) = Stmt::Res(s);
                Ok(())
            }
            Stmt::Edge(mut s) => {
                for half in &mut s.halves {
                    half.name = self.interpolate_expr(half.name)?;
                }
                *self.stmt_mut(id) = Stmt::Edge(s);
                Ok(())
            }
            Stmt::If(mut s) => {
                s.cond = self.interpolate_expr(s.cond)?;
                let (then_, else_) = (s.then_, s.else_);
                *self.stmt_mut(id) = Stmt::If(s);
                self.interpolate_stmt(then_, false)?;
                if let Some(e) = else_ {
                    self.interpolate_stmt(e, false)?;
                }
                Ok(())
            }
            Stmt::For(mut s) => {
                s.expr = self.interpolate_expr(s.expr)?;
                let body = s.body;
                *self.stmt_mut(id) = Stmt::For(s);
                self.interpolate_stmt(body, false)
            }
            Stmt::ForKv(mut s) => {
                s.expr = self.interpolate_expr(s.expr)?;
                let body = s.body;
                *self.stmt_mut(id) = Stmt::ForKv(s);
                self.interpolate_stmt(body, false)
            }
            Stmt::Program(s) => {
                for child in &s.body {
                    self.interpolate_stmt(*child, false)?;
                }
                if top_level {
                    self.lower_colon_classes(id)?;
                }
                Ok(())
            }
        }
    }

    fn fragments_to_expr(&mut self, fragments: Vec<Fragment>, span: SrcSpan) -> crate::ast::ExprId {
        let exprs: Vec<crate::ast::ExprId> = fragments
            .into_iter()
            .map(|frag| match frag {
                Fragment::Lit(text) => self.alloc_expr(Expr::Str(text), span),
                Fragment::Var(name) => self.alloc_expr(Expr::Var(VarExpr { name, target: None }), span),
            })
            .collect();
        let mut iter = exprs.into_iter();
        let first = match iter.next() {
            Some(e) => e,
            None => self.alloc_expr(Expr::Str(String::new()), span),
        };
        let mut acc = first;
        for next in iter {
            acc = self.alloc_expr(
                Expr::Call(CallExpr {
                    name: "+".to_owned(),
                    args: vec![acc, next],
                    var_call: false,
                    callee: None,
                }),
                span,
            );
        }
        acc
    }

    /// Moves every `class a:b { … }` into the body of class `a`, renamed to
    /// `b`. Runs repeatedly so `class a:b:c` lowers one level per round.
    fn lower_colon_classes(&mut self, program: StmtId) -> LangResult<()> {
        loop {
            let Stmt::Program(prog) = self.stmt(program) else {
                return Ok(());
            };
            let mut nested = None;
            for (pos, child) in prog.body.iter().enumerate() {
                if let Stmt::Class(class) = self.stmt(*child)
                    && let Some((parent, rest)) = class.name.split_once(':')
                {
                    nested = Some((pos, *child, parent.to_owned(), rest.to_owned()));
                    break;
                }
            }
            let Some((pos, child, parent, rest)) = nested else {
                return Ok(());
            };
            let span = self.stmt_span(child);
            if parent.is_empty() || rest.is_empty() {
                return Err(LangError::structural(
                    Cow::from(format!("malformed nested class name `{parent}:{rest}`")),
                    span,
                ));
            }
            // Find the parent class among the top-level statements.
            let Stmt::Program(prog) = self.stmt(program) else {
                unreachable!("checked above");
            };
            let parent_body = prog.body.iter().find_map(|sid| match self.stmt(*sid) {
                Stmt::Class(c) if c.name == parent => Some(c.body),
                _ => None,
            });
            let Some(parent_body) = parent_body else {
                return Err(LangError::structural(
                    Cow::from(format!("nested class `{parent}:{rest}` has no parent class `{parent}`")),
                    span,
                ));
            };
            // Rename and relocate.
            if let Stmt::Class(c) = self.stmt_mut(child) {
                c.name = rest;
            }
            if let Stmt::Program(p) = self.stmt_mut(program) {
                p.body.remove(pos);
            }
            if let Stmt::Program(p) = self.stmt_mut(parent_body) {
                p.body.push(child);
            }
        }
    }
}

/// Splits an interpolated literal into literal and variable fragments.
///
/// `${name}` embeds a variable reference; `\$` escapes a literal dollar; a
/// bare `$` not followed by `{` stays literal. Anything other than an
/// identifier inside the braces is rejected.
fn scan_fragments(s: &str, span: SrcSpan) -> LangResult<Vec<Fragment>> {
    let mut fragments = Vec::new();
    let mut lit = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'$') => {
                chars.next();
                lit.push('$');
            }
            '$' if chars.peek() == Some(&'{') => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '.' => name.push(c),
                        Some(c) => {
                            return Err(LangError::interpolation(
                                format!("unexpected `{c}` inside `${{…}}`"),
                                span,
                            ));
                        }
                        None => return Err(LangError::interpolation("unterminated `${…}`", span)),
                    }
                }
                if name.is_empty() {
                    return Err(LangError::interpolation("empty `${}`", span));
                }
                if !lit.is_empty() {
                    fragments.push(Fragment::Lit(std::mem::take(&mut lit)));
                }
                fragments.push(Fragment::Var(name));
            }
            c => lit.push(c),
        }
    }
    if !lit.is_empty() || fragments.is_empty() {
        fragments.push(Fragment::Lit(lit));
    }
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frags(s: &str) -> Vec<Fragment> {
        scan_fragments(s, SrcSpan::default()).expect("scan should succeed")
    }

    #[test]
    fn plain_text_is_one_literal_fragment() {
        assert_eq!(frags("hello"), vec![Fragment::Lit("hello".to_owned())]);
    }

    #[test]
    fn variable_between_literals() {
        assert_eq!(
            frags("t${blah}x"),
            vec![
                Fragment::Lit("t".to_owned()),
                Fragment::Var("blah".to_owned()),
                Fragment::Lit("x".to_owned()),
            ]
        );
    }

    #[test]
    fn escaped_dollar_stays_literal() {
        assert_eq!(frags(r"a\${b}"), vec![Fragment::Lit("a${b}".to_owned())]);
    }

    #[test]
    fn bare_dollar_without_brace_stays_literal() {
        assert_eq!(frags("cost: 5$"), vec![Fragment::Lit("cost: 5$".to_owned())]);
    }

    #[test]
    fn unterminated_interpolation_is_rejected() {
        let err = scan_fragments("a${b", SrcSpan::default()).unwrap_err();
        assert!(matches!(err, LangError::Interpolation { .. }));
    }

    #[test]
    fn non_identifier_interpolation_is_rejected() {
        let err = scan_fragments("a${1 + 2}", SrcSpan::default()).unwrap_err();
        assert!(matches!(err, LangError::Interpolation { .. }));
    }
}
