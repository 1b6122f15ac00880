use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_until,
    character::complete::char,
    combinator::{eof, map, value, verify},
    multi::many0,
    sequence::{delimited, preceded},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor(pub FieldType);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: ReturnType,
}

/// `None` is `void`.
pub type ReturnType = Option<FieldType>;

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Object(String),
    Short,
    Boolean,
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn is_long(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double)
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Number of operand stack / local variable slots a value of this type occupies.
    pub fn slot_size(&self) -> usize {
        if self.is_long() { 2 } else { 1 }
    }

    pub fn to_descriptor(&self) -> String {
        match self {
            FieldType::Byte => "B".to_string(),
            FieldType::Char => "C".to_string(),
            FieldType::Double => "D".to_string(),
            FieldType::Float => "F".to_string(),
            FieldType::Int => "I".to_string(),
            FieldType::Long => "J".to_string(),
            FieldType::Short => "S".to_string(),
            FieldType::Boolean => "Z".to_string(),
            FieldType::Object(class_name) => format!("L{class_name};"),
            FieldType::Array(element) => format!("[{}", element.to_descriptor()),
        }
    }
}

impl MethodDescriptor {
    /// Slots consumed by the arguments, not counting `this`.
    pub fn parameter_slots(&self) -> usize {
        self.parameters.iter().map(FieldType::slot_size).sum()
    }

    pub fn return_slots(&self) -> usize {
        self.return_type.as_ref().map_or(0, FieldType::slot_size)
    }
}

pub fn parse_field_descriptor(input: &str) -> IResult<&str, FieldDescriptor> {
    let (input, field_type) = parse_field_type(input)?;
    let (input, _) = end(input)?;
    Ok((input, FieldDescriptor(field_type)))
}

pub fn parse_method_descriptor(input: &str) -> IResult<&str, MethodDescriptor> {
    let (input, parameters) =
        delimited(char('('), many0(parse_field_type), char(')')).parse(input)?;

    let (input, return_type) = parse_return_type_descriptor(input)?;

    let (input, _) = end(input)?;
    Ok((
        input,
        MethodDescriptor {
            parameters,
            return_type,
        },
    ))
}

pub fn parse_return_type_descriptor(input: &str) -> IResult<&str, ReturnType> {
    alt((map(parse_field_type, Some), parse_void_type)).parse(input)
}

fn parse_field_type(input: &str) -> IResult<&str, FieldType> {
    alt((parse_base_type, parse_object_type, parse_array_type)).parse(input)
}

fn parse_base_type(input: &str) -> IResult<&str, FieldType> {
    alt((
        value(FieldType::Byte, char('B')),
        value(FieldType::Char, char('C')),
        value(FieldType::Double, char('D')),
        value(FieldType::Float, char('F')),
        value(FieldType::Int, char('I')),
        value(FieldType::Long, char('J')),
        value(FieldType::Short, char('S')),
        value(FieldType::Boolean, char('Z')),
    ))
    .parse(input)
}

fn parse_object_type(input: &str) -> IResult<&str, FieldType> {
    map(
        delimited(
            char('L'),
            verify(take_until(";"), |class_name: &str| !class_name.is_empty()),
            char(';'),
        ),
        |class_name: &str| FieldType::Object(class_name.to_string()),
    )
    .parse(input)
}

fn parse_array_type(input: &str) -> IResult<&str, FieldType> {
    map(preceded(char('['), parse_field_type), |field_type| {
        FieldType::Array(Box::new(field_type))
    })
    .parse(input)
}

fn parse_void_type(input: &str) -> IResult<&str, ReturnType> {
    value(None, char('V')).parse(input)
}

fn end(input: &str) -> IResult<&str, &str> {
    eof(input)
}
