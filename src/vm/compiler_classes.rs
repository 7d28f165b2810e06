//! Class layout: flattened field and method indices.
//!
//! A class starts from a copy of its superclass layout. New fields append.
//! A method whose name matches an inherited one takes over that slot, so a
//! call through any ancestor's index reaches the override; other methods
//! append.

use crate::ast::{ClassDefinition, MemberDecl, Program};
use crate::error::{CompileError, CompileErrorKind};

use super::compiler::CompileResult;
use super::executable::{Class, Field, Method};

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Pending,
    InProgress,
    Done,
}

/// Lay out every class of the program, superclasses first.
pub fn layout_classes(program: &Program) -> CompileResult<Vec<Class>> {
    let mut states = vec![State::Pending; program.classes.len()];
    let mut layouts: Vec<Option<Class>> = vec![None; program.classes.len()];
    for index in 0..program.classes.len() {
        layout_class(program, index, &mut states, &mut layouts)?;
    }
    Ok(layouts.into_iter().flatten().collect())
}

fn layout_class(
    program: &Program,
    index: usize,
    states: &mut [State],
    layouts: &mut [Option<Class>],
) -> CompileResult<()> {
    let definition = &program.classes[index];
    match states[index] {
        State::Done => return Ok(()),
        State::InProgress => {
            return Err(CompileError::new(
                CompileErrorKind::ClassHierarchyCycle(definition.name.clone()),
                definition.position,
            ))
        }
        State::Pending => states[index] = State::InProgress,
    }

    let (mut fields, mut methods) = match definition.super_class {
        None => (Vec::new(), Vec::new()),
        Some(super_index) => {
            if super_index as usize >= program.classes.len() {
                return Err(CompileError::new(
                    CompileErrorKind::UnknownClass(super_index),
                    definition.position,
                ));
            }
            layout_class(program, super_index as usize, states, layouts)?;
            match &layouts[super_index as usize] {
                Some(parent) => (parent.fields.clone(), parent.methods.clone()),
                None => (Vec::new(), Vec::new()),
            }
        }
    };

    add_members(program, definition, &mut fields, &mut methods)?;

    layouts[index] = Some(Class {
        name: definition.name.clone(),
        package: definition.package.clone(),
        super_class: definition.super_class,
        fields,
        methods,
    });
    states[index] = State::Done;
    Ok(())
}

fn add_members(
    program: &Program,
    definition: &ClassDefinition,
    fields: &mut Vec<Field>,
    methods: &mut Vec<Method>,
) -> CompileResult<()> {
    for member in &definition.members {
        let fail = |kind| Err(CompileError::new(kind, member.position()));
        match member {
            MemberDecl::Field { name, ty, .. } => {
                if fields.iter().any(|f| &f.name == name) {
                    return fail(CompileErrorKind::FieldNameDuplicate {
                        class: definition.name.clone(),
                        field: name.clone(),
                    });
                }
                if methods.iter().any(|m| &m.name == name) {
                    return fail(CompileErrorKind::FieldOverridesMethod {
                        class: definition.name.clone(),
                        field: name.clone(),
                    });
                }
                fields.push(Field {
                    name: name.clone(),
                    ty: ty.clone(),
                });
            }
            MemberDecl::Method { name, function, .. } => {
                if *function as usize >= program.functions.len() {
                    return fail(CompileErrorKind::UnknownFunction(*function));
                }
                if fields.iter().any(|f| &f.name == name) {
                    return fail(CompileErrorKind::MethodOverridesField {
                        class: definition.name.clone(),
                        method: name.clone(),
                    });
                }
                match methods.iter_mut().find(|m| &m.name == name) {
                    Some(inherited) => inherited.function = *function,
                    None => methods.push(Method {
                        name: name.clone(),
                        function: *function,
                    }),
                }
            }
        }
    }
    Ok(())
}
