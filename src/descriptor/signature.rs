//! Generic `Signature` attribute grammar (JVMS 4.7.9.1), reduced to the class
//! names it mentions.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_till1,
    character::complete::{char, one_of},
    combinator::{eof, map, opt},
    multi::{many0, many1},
    sequence::{delimited, pair, preceded},
};

use crate::name::ClassName;

type Names = Vec<String>;

pub fn class_signature_classes(signature: &str) -> Option<Vec<ClassName>> {
    finish(class_signature(signature))
}

pub fn method_signature_classes(signature: &str) -> Option<Vec<ClassName>> {
    finish(method_signature(signature))
}

pub fn field_signature_classes(signature: &str) -> Option<Vec<ClassName>> {
    finish(field_signature(signature))
}

fn finish(result: IResult<&str, Names>) -> Option<Vec<ClassName>> {
    let (_, names) = result.ok()?;
    Some(names.iter().map(|name| ClassName::new(name)).collect())
}

fn flatten(groups: Vec<Names>) -> Names {
    groups.into_iter().flatten().collect()
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_till1(|c| matches!(c, '.' | ';' | '[' | '/' | '<' | '>' | ':')).parse(input)
}

fn class_signature(input: &str) -> IResult<&str, Names> {
    let (input, parameters) = opt(type_parameters).parse(input)?;
    let (input, super_class) = class_type_signature(input)?;
    let (input, interfaces) = many0(class_type_signature).parse(input)?;
    eof(input)?;

    let mut names = parameters.unwrap_or_default();
    names.extend(super_class);
    names.extend(flatten(interfaces));
    Ok((input, names))
}

fn method_signature(input: &str) -> IResult<&str, Names> {
    let (input, parameters) = opt(type_parameters).parse(input)?;
    let (input, arguments) =
        delimited(char('('), many0(java_type_signature), char(')')).parse(input)?;
    let (input, result) = alt((
        java_type_signature,
        map(char('V'), |_| Names::new()),
    ))
    .parse(input)?;
    let (input, throws) = many0(preceded(
        char('^'),
        alt((class_type_signature, type_variable_signature)),
    ))
    .parse(input)?;
    eof(input)?;

    let mut names = parameters.unwrap_or_default();
    names.extend(flatten(arguments));
    names.extend(result);
    names.extend(flatten(throws));
    Ok((input, names))
}

fn field_signature(input: &str) -> IResult<&str, Names> {
    let (input, names) = reference_type_signature(input)?;
    eof(input)?;
    Ok((input, names))
}

fn type_parameters(input: &str) -> IResult<&str, Names> {
    map(
        delimited(char('<'), many1(type_parameter), char('>')),
        flatten,
    )
    .parse(input)
}

fn type_parameter(input: &str) -> IResult<&str, Names> {
    let (input, _) = identifier(input)?;
    // class bound may be empty when only interface bounds follow
    let (input, class_bound) = preceded(char(':'), opt(reference_type_signature)).parse(input)?;
    let (input, interface_bounds) =
        many0(preceded(char(':'), reference_type_signature)).parse(input)?;

    let mut names = class_bound.unwrap_or_default();
    names.extend(flatten(interface_bounds));
    Ok((input, names))
}

fn java_type_signature(input: &str) -> IResult<&str, Names> {
    alt((
        reference_type_signature,
        map(one_of("BCDFIJSZ"), |_| Names::new()),
    ))
    .parse(input)
}

fn reference_type_signature(input: &str) -> IResult<&str, Names> {
    alt((
        class_type_signature,
        type_variable_signature,
        array_type_signature,
    ))
    .parse(input)
}

fn class_type_signature(input: &str) -> IResult<&str, Names> {
    let (input, _) = char('L').parse(input)?;
    let (input, outer) = take_till1(|c| matches!(c, '<' | ';' | '.')).parse(input)?;
    let (input, outer_arguments) = opt(type_arguments).parse(input)?;
    let (input, inner) =
        many0(preceded(char('.'), pair(identifier, opt(type_arguments)))).parse(input)?;
    let (input, _) = char(';').parse(input)?;

    let mut class_name = outer.to_string();
    let mut arguments = outer_arguments.unwrap_or_default();
    for (simple_name, inner_arguments) in inner {
        class_name.push('$');
        class_name.push_str(simple_name);
        arguments.extend(inner_arguments.unwrap_or_default());
    }

    let mut names = vec![class_name];
    names.extend(arguments);
    Ok((input, names))
}

fn type_variable_signature(input: &str) -> IResult<&str, Names> {
    map(delimited(char('T'), identifier, char(';')), |_| Names::new()).parse(input)
}

fn array_type_signature(input: &str) -> IResult<&str, Names> {
    preceded(char('['), java_type_signature).parse(input)
}

fn type_arguments(input: &str) -> IResult<&str, Names> {
    map(
        delimited(char('<'), many1(type_argument), char('>')),
        flatten,
    )
    .parse(input)
}

fn type_argument(input: &str) -> IResult<&str, Names> {
    alt((
        map(char('*'), |_| Names::new()),
        preceded(opt(one_of("+-")), reference_type_signature),
    ))
    .parse(input)
}
