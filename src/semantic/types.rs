//! The nominal type system. `Int`, `String`, `Nil`, and `Unit` are plain
//! variants (identity is the variant itself); every record and array
//! declaration mints a fresh id, so structurally identical declarations stay
//! distinct. `Name` is the recursion knot: a type declaration first enters an
//! unbound alias and later binds it, which is what lets a batch of
//! declarations refer to each other.

use std::{cell::RefCell, fmt, rc::Rc};

/// Identity for record and array types. Two declarations never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone)]
pub enum Type {
    Int,
    String,
    Nil,
    /// The no-value type of procedures and valueless expressions
    Unit,
    Record(Rc<RecordType>),
    Array(Rc<ArrayType>),
    Name(Rc<NameAlias>),
    Function(Rc<FunctionType>),
}

#[derive(Debug)]
pub struct RecordType {
    pub id: TypeId,
    pub fields: Vec<RecordField>,
}

#[derive(Debug)]
pub struct RecordField {
    pub name: String,
    pub ty: Type,
}

impl RecordType {
    pub fn field_type(&self, name: &str) -> Option<&Type> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.ty)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }
}

#[derive(Debug)]
pub struct ArrayType {
    pub id: TypeId,
    pub element: Type,
}

/// A named forward reference. The binding is written exactly once, during the
/// body phase of the declaration batch that introduced the alias.
#[derive(Debug)]
pub struct NameAlias {
    pub name: String,
    binding: RefCell<Option<Type>>,
}

impl NameAlias {
    pub fn bind(&self, ty: Type) {
        let mut binding = self.binding.borrow_mut();
        assert!(binding.is_none(), "type alias `{}` bound twice", self.name);
        *binding = Some(ty);
    }

    pub fn binding(&self) -> Option<Type> {
        self.binding.borrow().clone()
    }
}

#[derive(Debug)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub result: Type,
}

impl Type {
    /// Follows alias bindings to a non-alias type. An unbound alias (an
    /// unresolved forward reference) is returned as-is; the declaration-batch
    /// cycle check guarantees alias chains reachable after semantic analysis
    /// are finite.
    pub fn actual(&self) -> Type {
        let mut current = self.clone();

        while let Type::Name(alias) = &current {
            match alias.binding() {
                Some(bound) => current = bound,
                None => break,
            }
        }

        current
    }

    pub fn is_record(&self) -> bool {
        matches!(self.actual(), Type::Record(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.actual(), Type::Array(_))
    }

    pub fn is_int(&self) -> bool {
        matches!(self.actual(), Type::Int)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.actual(), Type::Nil)
    }

    pub fn is_unit(&self) -> bool {
        matches!(self.actual(), Type::Unit)
    }
}

/// Nominal equality: the `actual` representatives must be the same identity.
/// The one exception is `Nil`, which is equal to any record type (a record
/// variable may hold `nil`) but not to another `Nil`.
pub fn equals(a: &Type, b: &Type) -> bool {
    match (a.actual(), b.actual()) {
        (Type::Int, Type::Int) => true,
        (Type::String, Type::String) => true,
        (Type::Unit, Type::Unit) => true,
        (Type::Record(x), Type::Record(y)) => x.id == y.id,
        (Type::Array(x), Type::Array(y)) => x.id == y.id,
        (Type::Record(_), Type::Nil) | (Type::Nil, Type::Record(_)) => true,
        _ => false,
    }
}

/// True when a value of type `source` may be stored into a slot of type
/// `target`.
pub fn is_assignable(target: &Type, source: &Type) -> bool {
    equals(target, source) || (source.is_nil() && target.is_record())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::String => f.write_str("string"),
            Type::Nil => f.write_str("nil"),
            Type::Unit => f.write_str("unit"),
            Type::Record(record) => {
                f.write_str("{")?;
                for (i, field) in record.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty.name_or_kind())?;
                }
                f.write_str("}")
            }
            Type::Array(array) => write!(f, "array of {}", array.element.name_or_kind()),
            Type::Name(alias) => f.write_str(&alias.name),
            Type::Function(function) => {
                f.write_str("(")?;
                for (i, param) in function.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", param.name_or_kind())?;
                }
                write!(f, ") -> {}", function.result.name_or_kind())
            }
        }
    }
}

impl Type {
    /// Short rendering that never recurses into record fields (recursive
    /// records would otherwise print forever).
    fn name_or_kind(&self) -> String {
        match self {
            Type::Record(_) => "record".to_owned(),
            Type::Array(_) => "array".to_owned(),
            Type::Name(alias) => alias.name.clone(),
            other => other.to_string(),
        }
    }
}

/// Mints record/array identities and assembles the composite types.
#[derive(Debug, Default)]
pub struct TypeContext {
    next_id: u32,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> TypeId {
        let id = TypeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn new_record(&mut self, fields: Vec<RecordField>) -> Type {
        Type::Record(Rc::new(RecordType {
            id: self.fresh_id(),
            fields,
        }))
    }

    pub fn new_array(&mut self, element: Type) -> Type {
        Type::Array(Rc::new(ArrayType {
            id: self.fresh_id(),
            element,
        }))
    }

    pub fn new_alias(&mut self, name: impl Into<String>) -> Rc<NameAlias> {
        Rc::new(NameAlias {
            name: name.into(),
            binding: RefCell::new(None),
        })
    }

    pub fn new_function(&mut self, params: Vec<Type>, result: Type) -> Type {
        Type::Function(Rc::new(FunctionType { params, result }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_identity() {
        assert!(equals(&Type::Int, &Type::Int));
        assert!(equals(&Type::String, &Type::String));
        assert!(!equals(&Type::Int, &Type::String));
    }

    #[test]
    fn structurally_identical_arrays_are_distinct() {
        let mut ctx = TypeContext::new();
        let a = ctx.new_array(Type::Int);
        let b = ctx.new_array(Type::Int);

        assert!(equals(&a, &a));
        assert!(!equals(&a, &b));
    }

    #[test]
    fn alias_chain_resolves_to_binding() {
        let mut ctx = TypeContext::new();
        let inner = ctx.new_alias("a");
        inner.bind(Type::Int);
        let outer = ctx.new_alias("b");
        outer.bind(Type::Name(inner));

        let ty = Type::Name(outer);
        assert!(matches!(ty.actual(), Type::Int));
        assert!(equals(&ty, &Type::Int));
    }

    #[test]
    fn unbound_alias_is_its_own_actual() {
        let mut ctx = TypeContext::new();
        let alias = Type::Name(ctx.new_alias("pending"));

        assert!(matches!(alias.actual(), Type::Name(_)));
    }

    #[test]
    fn nil_relates_to_records_only() {
        let mut ctx = TypeContext::new();
        let record = ctx.new_record(vec![RecordField {
            name: "x".to_owned(),
            ty: Type::Int,
        }]);
        let array = ctx.new_array(Type::Int);

        assert!(equals(&record, &Type::Nil));
        assert!(equals(&Type::Nil, &record));
        assert!(!equals(&Type::Nil, &Type::Nil));
        assert!(!equals(&Type::Nil, &array));

        assert!(is_assignable(&record, &Type::Nil));
        assert!(!is_assignable(&array, &Type::Nil));
    }
}
