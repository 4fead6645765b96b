//! Lexical nesting metadata for the translator: a `Level` is a frame plus a
//! back reference to the level of the enclosing function. The outermost level
//! has no parent; its frame belongs to the program body.

use std::rc::Rc;

use self::{
    frame::{Access, FrameDialect, FrameRef},
    temp::{Label, TempFactory},
};

pub mod escape;
pub mod frame;
pub mod mips32;
pub mod temp;
pub mod x64;

#[derive(Debug)]
pub struct Level {
    parent: Option<Rc<Level>>,
    frame: FrameRef,
}

impl Level {
    /// The level of the program body. Its frame has no formals, not even a
    /// static link.
    pub fn outermost(dialect: &dyn FrameDialect, temps: &mut TempFactory) -> Rc<Level> {
        let frame = dialect.new_frame(temps.named_label("_main"), &[], temps);

        Rc::new(Level {
            parent: None,
            frame,
        })
    }

    /// A level for a function nested in `parent`. A static link formal is
    /// prepended to the source formals; it always escapes so the frame slot
    /// holding it has a stable address.
    pub fn nested(
        parent: Rc<Level>,
        name: Label,
        formals: &[bool],
        dialect: &dyn FrameDialect,
        temps: &mut TempFactory,
    ) -> Rc<Level> {
        let mut all_formals = Vec::with_capacity(formals.len() + 1);
        all_formals.push(true);
        all_formals.extend_from_slice(formals);

        let frame = dialect.new_frame(name, &all_formals, temps);

        Rc::new(Level {
            parent: Some(parent),
            frame,
        })
    }

    pub fn parent(&self) -> Option<&Rc<Level>> {
        self.parent.as_ref()
    }

    pub fn frame(&self) -> &FrameRef {
        &self.frame
    }

    /// The static link's access (the first formal). The outermost level has
    /// none.
    pub fn static_link(&self) -> Option<Access> {
        self.frame.borrow().formals().first().copied()
    }

    /// The formal accesses for the source-level parameters, skipping the
    /// static link.
    pub fn source_formals(&self) -> Vec<Access> {
        self.frame.borrow().formals().iter().skip(1).copied().collect()
    }

    pub fn same_level(a: &Rc<Level>, b: &Rc<Level>) -> bool {
        Rc::ptr_eq(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::{x64::X64Dialect, *};

    #[test]
    fn nested_level_prepends_an_escaping_static_link() {
        let mut temps = TempFactory::new();
        let dialect = X64Dialect;

        let outer = Level::outermost(&dialect, &mut temps);
        assert!(outer.parent().is_none());
        assert!(outer.static_link().is_none());

        let inner = Level::nested(
            outer.clone(),
            temps.named_label("f"),
            &[false],
            &dialect,
            &mut temps,
        );

        assert!(inner.parent().is_some());
        assert!(matches!(
            inner.static_link(),
            Some(Access::InFrame(_))
        ));
        assert_eq!(inner.source_formals().len(), 1);
    }
}
