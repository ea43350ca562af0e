use serde::Serialize;
use std::collections::HashMap;

pub const REQUIRED_MESSAGE: &str = "This field is required.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Password,
}

impl FieldKind {
    fn input_type(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Password => "password",
        }
    }
}

#[derive(Debug)]
pub struct Field {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
}

/// Static description of a form: its required fields and submit label.
#[derive(Debug)]
pub struct FormSchema {
    pub fields: &'static [Field],
    pub submit: &'static str,
}

pub const FIND_MOVIE: FormSchema = FormSchema {
    fields: &[Field {
        name: "title",
        label: "Movie Title",
        kind: FieldKind::Text,
    }],
    submit: "Add Movie",
};

pub const REGISTER: FormSchema = FormSchema {
    fields: &[
        Field {
            name: "email",
            label: "User Email",
            kind: FieldKind::Text,
        },
        Field {
            name: "username",
            label: "User Name",
            kind: FieldKind::Text,
        },
        Field {
            name: "password",
            label: "Password",
            kind: FieldKind::Password,
        },
    ],
    submit: "Sign In",
};

pub const LOGIN: FormSchema = FormSchema {
    fields: &[
        Field {
            name: "email",
            label: "User Email",
            kind: FieldKind::Text,
        },
        Field {
            name: "password",
            label: "Password",
            kind: FieldKind::Password,
        },
    ],
    submit: "Log In",
};

#[derive(Serialize, Debug)]
pub struct FieldView {
    pub name: &'static str,
    pub label: &'static str,
    pub input_type: &'static str,
    pub value: String,
    pub errors: Vec<&'static str>,
}

/// What the templates need to draw a form.
#[derive(Serialize, Debug)]
pub struct FormView {
    pub fields: Vec<FieldView>,
    pub submit: &'static str,
}

impl FormSchema {
    pub fn blank(&self) -> FormView {
        self.view(&HashMap::new(), &[])
    }

    /// Redisplays `raw` with `message` attached to the field `name`.
    pub fn reject(
        &self,
        raw: &HashMap<String, String>,
        name: &str,
        message: &'static str,
    ) -> FormView {
        self.view(raw, &[(name, message)])
    }

    fn view(&self, raw: &HashMap<String, String>, errors: &[(&str, &'static str)]) -> FormView {
        let fields = self
            .fields
            .iter()
            .map(|field| FieldView {
                name: field.name,
                label: field.label,
                input_type: field.kind.input_type(),
                // Passwords are never echoed back.
                value: match field.kind {
                    FieldKind::Password => String::new(),
                    FieldKind::Text => raw.get(field.name).cloned().unwrap_or_default(),
                },
                errors: errors
                    .iter()
                    .filter(|(name, _)| *name == field.name)
                    .map(|(_, message)| *message)
                    .collect(),
            })
            .collect();
        FormView {
            fields,
            submit: self.submit,
        }
    }
}

/// Field values that passed validation, keyed by field name.
#[derive(Debug)]
pub struct Submission {
    values: HashMap<&'static str, String>,
}

impl Submission {
    pub fn take(&mut self, name: &str) -> String {
        self.values.remove(name).unwrap_or_default()
    }
}

/// Checks every field of `schema` is present and not blank.
///
/// On failure the returned view carries the submitted values and one error
/// per missing field, ready to be rendered again.
pub fn validate(
    schema: &FormSchema,
    raw: &HashMap<String, String>,
) -> Result<Submission, FormView> {
    let missing: Vec<(&str, &'static str)> = schema
        .fields
        .iter()
        .filter(|field| {
            raw.get(field.name)
                .map_or(true, |value| value.trim().is_empty())
        })
        .map(|field| (field.name, REQUIRED_MESSAGE))
        .collect();
    if !missing.is_empty() {
        return Err(schema.view(raw, &missing));
    }
    let values = schema
        .fields
        .iter()
        .filter_map(|field| raw.get(field.name).map(|value| (field.name, value.clone())))
        .collect();
    Ok(Submission { values })
}

pub trait FormInput: Sized {
    const SCHEMA: &'static FormSchema;
    fn from_submission(submission: Submission) -> Self;

    fn parse(raw: &HashMap<String, String>) -> Result<Self, FormView> {
        validate(Self::SCHEMA, raw).map(Self::from_submission)
    }
}

#[derive(Debug)]
pub struct FindMovieInput {
    pub title: String,
}

impl FormInput for FindMovieInput {
    const SCHEMA: &'static FormSchema = &FIND_MOVIE;

    fn from_submission(mut submission: Submission) -> Self {
        FindMovieInput {
            title: submission.take("title"),
        }
    }
}

#[derive(Debug)]
pub struct RegisterInput {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl FormInput for RegisterInput {
    const SCHEMA: &'static FormSchema = &REGISTER;

    fn from_submission(mut submission: Submission) -> Self {
        RegisterInput {
            email: submission.take("email"),
            username: submission.take("username"),
            password: submission.take("password"),
        }
    }
}

#[derive(Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl FormInput for LoginInput {
    const SCHEMA: &'static FormSchema = &LOGIN;

    fn from_submission(mut submission: Submission) -> Self {
        LoginInput {
            email: submission.take("email"),
            password: submission.take("password"),
        }
    }
}
